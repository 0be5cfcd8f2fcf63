// Evidence store interface: occurrences, notes and projects.

pub mod grafeas;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use provenance_common::types::{Note, Occurrence, Project};
use thiserror::Error;

use crate::error::ErrorCode;

pub use grafeas::GrafeasClient;
pub use memory::MemoryEvidenceStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("evidence store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("evidence store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode evidence store response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid evidence store url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl StoreError {
    /// External code for pass-through operations.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            _ => ErrorCode::Internal,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub filter: Option<String>,
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
}

impl ListParams {
    pub fn filtered(filter: impl Into<String>) -> Self {
        Self { filter: Some(filter.into()), ..Self::default() }
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OccurrencePage {
    pub occurrences: Vec<Occurrence>,
    pub next_page_token: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotePage {
    pub notes: Vec<Note>,
    pub next_page_token: String,
}

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn batch_create_occurrences(
        &self,
        parent: &str,
        occurrences: Vec<Occurrence>,
    ) -> Result<Vec<Occurrence>, StoreError>;

    async fn list_occurrences(
        &self,
        parent: &str,
        params: &ListParams,
    ) -> Result<OccurrencePage, StoreError>;

    async fn update_occurrence(
        &self,
        name: &str,
        occurrence: Occurrence,
        update_mask: Option<&str>,
    ) -> Result<Occurrence, StoreError>;

    async fn create_note(&self, parent: &str, note_id: &str, note: Note)
        -> Result<Note, StoreError>;

    /// Create notes keyed by note id. Fails without creating anything when an id is taken.
    async fn batch_create_notes(
        &self,
        parent: &str,
        notes: BTreeMap<String, Note>,
    ) -> Result<Vec<Note>, StoreError>;

    async fn list_notes(&self, parent: &str, params: &ListParams) -> Result<NotePage, StoreError>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_project(&self, name: &str) -> Result<Project, StoreError>;

    async fn create_project(&self, project: Project) -> Result<Project, StoreError>;
}
