// Idempotent collector registration.
//
// A collector's notes are identified by `{collector_id}-{kind_token}`, so the
// same registration always resolves to the same note names: existing notes are
// adopted, only the missing ones are created in a single batch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use provenance_common::types::{Note, NoteKind};
use tracing::{debug, info, info_span, Instrument};

use crate::error::{create_error, create_error_with_code, ApiError, ErrorCode, NO_CAUSE};
use crate::filter::quote;
use crate::store::{EvidenceStore, ListParams, StoreError};

pub fn note_id(collector_id: &str, kind: NoteKind) -> String {
    format!("{collector_id}-{}", kind.token())
}

/// `projects/p/notes/c-build` -> `c-build`.
pub fn note_id_from_name(name: &str) -> &str {
    name.rsplit_once("/notes/").map_or(name, |(_, id)| id)
}

pub struct CollectorRegistry {
    store: Arc<dyn EvidenceStore>,
    project: String,
}

impl CollectorRegistry {
    pub fn new(store: Arc<dyn EvidenceStore>, project: impl Into<String>) -> Self {
        Self { store, project: project.into() }
    }

    /// Resolve every note of `collector_id` to a persisted identity, keyed by note id.
    pub async fn register(
        &self,
        collector_id: &str,
        notes: Vec<Note>,
    ) -> Result<BTreeMap<String, Note>, ApiError> {
        self.register_notes(collector_id, notes)
            .instrument(info_span!("provenance.registration.register", collector_id))
            .await
    }

    async fn register_notes(
        &self,
        collector_id: &str,
        notes: Vec<Note>,
    ) -> Result<BTreeMap<String, Note>, ApiError> {
        if collector_id.trim().is_empty() {
            return Err(create_error_with_code(
                ErrorCode::InvalidArgument,
                "collector ID is required",
                NO_CAUSE,
            ));
        }

        if notes.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut resolved = BTreeMap::new();
        for note in notes {
            let id = note_id(collector_id, note.kind);
            if resolved.insert(id, note).is_some() {
                return Err(create_error_with_code(
                    ErrorCode::InvalidArgument,
                    "cannot use more than one note type when registering a collector",
                    NO_CAUSE,
                ));
            }
        }

        let mut pending: BTreeSet<String> = resolved.keys().cloned().collect();
        self.adopt_existing(collector_id, &mut resolved, &mut pending).await?;

        if pending.is_empty() {
            debug!("all collector notes already registered");
            return Ok(resolved);
        }

        let to_create: BTreeMap<String, Note> = pending
            .iter()
            .filter_map(|id| resolved.get(id).map(|note| (id.clone(), note.clone())))
            .collect();

        match self.store.batch_create_notes(&self.project, to_create).await {
            Ok(created) => {
                for note in created {
                    let id = note_id_from_name(&note.name).to_string();
                    if let Some(entry) = resolved.get_mut(&id) {
                        entry.name = note.name;
                        pending.remove(&id);
                    }
                }
            }
            Err(StoreError::AlreadyExists(reason)) => {
                info!(%reason, "collector notes were registered concurrently, adopting them");
                self.adopt_existing(collector_id, &mut resolved, &mut pending).await?;
            }
            Err(error) => return Err(create_error("error creating notes", Some(error))),
        }

        if !pending.is_empty() {
            let missing = pending.into_iter().collect::<Vec<_>>().join(", ");
            return Err(create_error(
                "error creating notes",
                Some(format!("notes were not persisted: {missing}")),
            ));
        }

        info!(notes = resolved.len(), "registered collector");
        Ok(resolved)
    }

    /// Copy names of already persisted notes into `resolved` and drop them from `pending`.
    async fn adopt_existing(
        &self,
        collector_id: &str,
        resolved: &mut BTreeMap<String, Note>,
        pending: &mut BTreeSet<String>,
    ) -> Result<(), ApiError> {
        let prefix = format!("{}/notes/{collector_id}-", self.project);
        let mut params = ListParams::filtered(format!("name.startsWith({})", quote(&prefix)));

        loop {
            let page = self
                .store
                .list_notes(&self.project, &params)
                .await
                .map_err(|error| create_error("error listing notes", Some(error)))?;

            for note in page.notes {
                let id = note_id_from_name(&note.name).to_string();
                if let Some(entry) = resolved.get_mut(&id) {
                    entry.name = note.name;
                    pending.remove(&id);
                }
            }

            if page.next_page_token.is_empty() {
                return Ok(());
            }
            params.page_token = Some(page.next_page_token);
        }
    }
}
