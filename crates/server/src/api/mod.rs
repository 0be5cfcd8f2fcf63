// REST surface. Every operation is scoped to the configured evidence store project.

mod collectors;
mod notes;
mod occurrences;
mod resources;

use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::error::{create_error_with_code, ApiError};
use crate::pagination::PaginationEngine;
use crate::registration::CollectorRegistry;
use crate::resources::ResourceManager;
use crate::store::{EvidenceStore, StoreError};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn EvidenceStore>,
    pub engine: Arc<PaginationEngine>,
    pub registry: Arc<CollectorRegistry>,
    pub resources: Arc<dyn ResourceManager>,
    pub project: Arc<str>,
    /// Alias of the index the evidence store writes occurrences to.
    pub occurrences_alias: Arc<str>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1alpha1/occurrences", get(occurrences::list_occurrences))
        .route("/v1alpha1/occurrences:batchCreate", post(occurrences::batch_create_occurrences))
        .route("/v1alpha1/occurrences/{id}", patch(occurrences::update_occurrence))
        .route(
            "/v1alpha1/versioned-resource-occurrences",
            get(occurrences::list_versioned_resource_occurrences),
        )
        .route("/v1alpha1/resources", get(resources::list_resources))
        .route("/v1alpha1/generic-resources", get(resources::list_generic_resources))
        .route(
            "/v1alpha1/generic-resources/{id}/versions",
            get(resources::list_generic_resource_versions),
        )
        .route("/v1alpha1/collectors/{id}/register", post(collectors::register_collector))
        .route("/v1alpha1/notes", post(notes::create_note))
        .with_state(state)
}

/// Evidence store failures keep their code: not-found stays not-found.
fn store_failure(message: &str, error: StoreError) -> ApiError {
    create_error_with_code(error.code(), message, Some(error))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Method, Request},
        response::Response,
        Router,
    };
    use serde_json::Value;

    use super::{router, ApiState};
    use crate::filter::CelFilterCompiler;
    use crate::pagination::PaginationEngine;
    use crate::registration::CollectorRegistry;
    use crate::resources::IndexedResourceManager;
    use crate::search::{IndexManager, MemorySearchIndex};
    use crate::store::MemoryEvidenceStore;

    pub const PROJECT: &str = "projects/provenance";
    pub const OCCURRENCES_ALIAS: &str = "occurrences";

    pub struct Harness {
        pub router: Router,
        pub index: Arc<MemorySearchIndex>,
        pub store: Arc<MemoryEvidenceStore>,
    }

    pub async fn harness() -> Harness {
        let index = Arc::new(MemorySearchIndex::new());
        for kind in crate::bootstrap::INDEX_KINDS {
            index
                .ensure_index(&index.index_name(kind), &index.alias_name(kind), kind)
                .await
                .expect("memory index");
        }
        let store = Arc::new(MemoryEvidenceStore::new());
        let engine = Arc::new(PaginationEngine::new(index.clone(), Arc::new(CelFilterCompiler), "5m"));
        let state = ApiState {
            store: store.clone(),
            engine: engine.clone(),
            registry: Arc::new(CollectorRegistry::new(store.clone(), PROJECT)),
            resources: Arc::new(IndexedResourceManager::new(index.clone(), engine, index.as_ref())),
            project: Arc::from(PROJECT),
            occurrences_alias: Arc::from(OCCURRENCES_ALIAS),
        };

        Harness { router: router(state), index, store }
    }

    pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    pub fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request should build")
    }

    pub async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be json")
    }
}
