// In-process evidence store. Filters are evaluated with the same dialect as the search index.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use provenance_common::types::{Note, Occurrence, Project};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{EvidenceStore, ListParams, NotePage, OccurrencePage, ProjectStore, StoreError};
use crate::filter::{CelFilterCompiler, FilterCompiler};
use crate::search::memory::matches;

#[derive(Default)]
struct State {
    projects: BTreeMap<String, Project>,
    occurrences: Vec<Occurrence>,
    notes: Vec<Note>,
}

#[derive(Default)]
pub struct MemoryEvidenceStore {
    state: RwLock<State>,
    notes_created: AtomicU64,
    note_batches: AtomicU64,
    note_lists: AtomicU64,
    projects_created: AtomicU64,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notes(&self) -> Vec<Note> {
        self.state.read().await.notes.clone()
    }

    pub async fn occurrences(&self) -> Vec<Occurrence> {
        self.state.read().await.occurrences.clone()
    }

    pub fn notes_created(&self) -> u64 {
        self.notes_created.load(Ordering::SeqCst)
    }

    pub fn note_batches(&self) -> u64 {
        self.note_batches.load(Ordering::SeqCst)
    }

    pub fn note_lists(&self) -> u64 {
        self.note_lists.load(Ordering::SeqCst)
    }

    pub fn projects_created(&self) -> u64 {
        self.projects_created.load(Ordering::SeqCst)
    }
}

fn page<T: Clone + Serialize>(
    items: &[T],
    params: &ListParams,
) -> Result<(Vec<T>, String), StoreError> {
    let query = match params.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        Some(filter) => Some(
            CelFilterCompiler
                .compile(filter)
                .map_err(|error| StoreError::InvalidArgument(error.to_string()))?,
        ),
        None => None,
    };

    let mut selected = Vec::new();
    for item in items {
        let included = match &query {
            Some(query) => {
                let document = serde_json::to_value(item)?;
                matches(query, &document)
                    .map_err(|error| StoreError::InvalidArgument(error.to_string()))?
            }
            None => true,
        };
        if included {
            selected.push(item.clone());
        }
    }

    let offset = match params.page_token.as_deref().filter(|token| !token.is_empty()) {
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| StoreError::InvalidArgument(format!("invalid page token {token}")))?,
        None => 0,
    };
    let size = params.page_size.filter(|size| *size > 0).map_or(usize::MAX, |size| size as usize);

    let end = offset.saturating_add(size).min(selected.len());
    let next_page_token = if end < selected.len() { end.to_string() } else { String::new() };
    let items = selected.into_iter().skip(offset).take(end.saturating_sub(offset)).collect();
    Ok((items, next_page_token))
}

fn note_name(parent: &str, note_id: &str) -> String {
    format!("{parent}/notes/{note_id}")
}

#[async_trait]
impl EvidenceStore for MemoryEvidenceStore {
    async fn batch_create_occurrences(
        &self,
        parent: &str,
        occurrences: Vec<Occurrence>,
    ) -> Result<Vec<Occurrence>, StoreError> {
        let now = Utc::now();
        let created: Vec<Occurrence> = occurrences
            .into_iter()
            .map(|mut occurrence| {
                occurrence.name = format!("{parent}/occurrences/{}", Uuid::new_v4());
                occurrence.create_time = Some(now);
                occurrence.update_time = Some(now);
                occurrence
            })
            .collect();

        self.state.write().await.occurrences.extend(created.iter().cloned());
        Ok(created)
    }

    async fn list_occurrences(
        &self,
        _parent: &str,
        params: &ListParams,
    ) -> Result<OccurrencePage, StoreError> {
        let state = self.state.read().await;
        let (occurrences, next_page_token) = page(&state.occurrences, params)?;
        Ok(OccurrencePage { occurrences, next_page_token })
    }

    async fn update_occurrence(
        &self,
        name: &str,
        occurrence: Occurrence,
        _update_mask: Option<&str>,
    ) -> Result<Occurrence, StoreError> {
        let mut state = self.state.write().await;
        let existing = state
            .occurrences
            .iter_mut()
            .find(|existing| existing.name == name)
            .ok_or_else(|| StoreError::NotFound(format!("occurrence {name}")))?;

        let create_time = existing.create_time;
        *existing = Occurrence {
            name: name.to_string(),
            create_time,
            update_time: Some(Utc::now()),
            ..occurrence
        };
        Ok(existing.clone())
    }

    async fn create_note(
        &self,
        parent: &str,
        note_id: &str,
        note: Note,
    ) -> Result<Note, StoreError> {
        if note_id.is_empty() {
            return Err(StoreError::InvalidArgument("note id is required".to_string()));
        }

        let notes = BTreeMap::from([(note_id.to_string(), note)]);
        let created = self.batch_create_notes(parent, notes).await?;
        created
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(note_name(parent, note_id)))
    }

    async fn batch_create_notes(
        &self,
        parent: &str,
        notes: BTreeMap<String, Note>,
    ) -> Result<Vec<Note>, StoreError> {
        self.note_batches.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.write().await;
        for note_id in notes.keys() {
            let name = note_name(parent, note_id);
            if state.notes.iter().any(|note| note.name == name) {
                return Err(StoreError::AlreadyExists(format!("note {name}")));
            }
        }

        let now = Utc::now();
        let created: Vec<Note> = notes
            .into_iter()
            .map(|(note_id, mut note)| {
                note.name = note_name(parent, &note_id);
                note.create_time = Some(now);
                note.update_time = Some(now);
                note
            })
            .collect();

        self.notes_created.fetch_add(created.len() as u64, Ordering::SeqCst);
        state.notes.extend(created.iter().cloned());
        Ok(created)
    }

    async fn list_notes(&self, _parent: &str, params: &ListParams) -> Result<NotePage, StoreError> {
        self.note_lists.fetch_add(1, Ordering::SeqCst);

        let state = self.state.read().await;
        let (notes, next_page_token) = page(&state.notes, params)?;
        Ok(NotePage { notes, next_page_token })
    }
}

#[async_trait]
impl ProjectStore for MemoryEvidenceStore {
    async fn get_project(&self, name: &str) -> Result<Project, StoreError> {
        self.state
            .read()
            .await
            .projects
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("project {name}")))
    }

    async fn create_project(&self, project: Project) -> Result<Project, StoreError> {
        let mut state = self.state.write().await;
        if state.projects.contains_key(&project.name) {
            return Err(StoreError::AlreadyExists(format!("project {}", project.name)));
        }

        self.projects_created.fetch_add(1, Ordering::SeqCst);
        state.projects.insert(project.name.clone(), project.clone());
        Ok(project)
    }
}
