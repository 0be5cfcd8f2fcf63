// Search index interface: structured search bodies, search contexts, index provisioning.

pub mod elastic;
pub mod memory;

use async_trait::async_trait;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

pub use elastic::{ElasticIndexManager, ElasticSearchIndex};
pub use memory::MemorySearchIndex;

/// Index document kinds provisioned at startup.
pub const GENERIC_RESOURCES_KIND: &str = "generic-resources";
pub const GENERIC_RESOURCE_VERSIONS_KIND: &str = "generic-resource-versions";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("search index request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("search index returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode search index response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid search index url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("unknown document kind: {0}")]
    UnknownKind(String),

    #[error("bulk write failed: {0}")]
    Bulk(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Single-field sort clause, serialized as `{"field": "asc"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: SortOrder::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: SortOrder::Desc }
    }
}

impl Serialize for Sort {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.field, &self.order)?;
        map.end()
    }
}

/// Keep one hit per distinct value of `field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collapse {
    pub field: String,
}

/// Binds a search to an existing search context and extends its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointInTime {
    pub id: String,
    pub keep_alive: String,
}

/// Structured search request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Sort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse: Option<Collapse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pit: Option<PointInTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub source: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub hits: Vec<Hit>,
    /// Total matches for the query; distinct collapse values when the body collapses.
    pub total: u64,
    /// Set when `total` is an estimate that may undercount.
    pub approximate_total: bool,
    /// Context id to continue with, when the index refreshed it.
    pub context_id: Option<String>,
}

/// Isolated, time-bounded snapshot of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchContext {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub id: String,
    pub source: Value,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Run `body` against `index`. A body bound to a search context ignores `index`.
    async fn search(&self, index: &str, body: &SearchBody) -> Result<SearchResults, IndexError>;

    async fn open_search_context(
        &self,
        index: &str,
        keep_alive: &str,
    ) -> Result<SearchContext, IndexError>;

    /// Create documents that do not exist yet; existing ids are left untouched.
    async fn bulk_create(&self, index: &str, documents: Vec<IndexDocument>)
        -> Result<(), IndexError>;
}

#[async_trait]
pub trait IndexManager: Send + Sync {
    fn index_name(&self, kind: &str) -> String;

    fn alias_name(&self, kind: &str) -> String;

    async fn ensure_index(&self, index: &str, alias: &str, kind: &str) -> Result<(), IndexError>;
}
