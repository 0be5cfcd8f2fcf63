// Generic resource tracking: every resource URI seen on an occurrence becomes a
// version of a generic resource, both kept in their own search indices.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use provenance_common::protocol::api::{
    ListGenericResourceVersionsRequest, ListGenericResourceVersionsResponse,
    ListGenericResourcesRequest, ListGenericResourcesResponse,
};
use provenance_common::resource::{parse_resource_uri, resource_version_id, ResourceUri};
use provenance_common::types::{GenericResource, GenericResourceVersion, Occurrence};
use serde_json::json;
use tracing::debug;

use crate::error::{create_error, ApiError};
use crate::filter::{all_of, any_of, quote};
use crate::pagination::{decode_hits, PaginationEngine};
use crate::query::ListRequest;
use crate::search::{
    IndexDocument, IndexManager, SearchBody, SearchIndex, Sort, GENERIC_RESOURCES_KIND,
    GENERIC_RESOURCE_VERSIONS_KIND,
};

#[async_trait]
pub trait ResourceManager: Send + Sync {
    async fn batch_create_generic_resources(&self, occurrences: &[Occurrence])
        -> Result<(), ApiError>;

    async fn batch_create_generic_resource_versions(
        &self,
        occurrences: &[Occurrence],
    ) -> Result<(), ApiError>;

    async fn list_generic_resources(
        &self,
        request: &ListGenericResourcesRequest,
    ) -> Result<ListGenericResourcesResponse, ApiError>;

    async fn list_generic_resource_versions(
        &self,
        request: &ListGenericResourceVersionsRequest,
    ) -> Result<ListGenericResourceVersionsResponse, ApiError>;

    async fn get_generic_resource(&self, id: &str) -> Result<Option<GenericResource>, ApiError>;
}

pub struct IndexedResourceManager {
    index: Arc<dyn SearchIndex>,
    engine: Arc<PaginationEngine>,
    resources_alias: String,
    versions_alias: String,
}

impl IndexedResourceManager {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        engine: Arc<PaginationEngine>,
        indices: &dyn IndexManager,
    ) -> Self {
        Self {
            index,
            engine,
            resources_alias: indices.alias_name(GENERIC_RESOURCES_KIND),
            versions_alias: indices.alias_name(GENERIC_RESOURCE_VERSIONS_KIND),
        }
    }
}

/// Distinct parsed resource URIs of `occurrences`, keyed by URI.
fn parse_occurrence_uris(
    occurrences: &[Occurrence],
) -> Result<BTreeMap<String, (ResourceUri, &Occurrence)>, ApiError> {
    let mut parsed = BTreeMap::new();
    for occurrence in occurrences {
        let uri = &occurrence.resource.uri;
        if parsed.contains_key(uri) {
            continue;
        }
        let resource = parse_resource_uri(uri)
            .map_err(|error| create_error("error parsing resource uri", Some(error)))?;
        parsed.insert(uri.clone(), (resource, occurrence));
    }
    Ok(parsed)
}

fn combine(filter: Option<&str>, constraint: Option<String>) -> Option<String> {
    let filter = filter.map(str::trim).filter(|filter| !filter.is_empty());
    match (filter, constraint) {
        (Some(filter), Some(constraint)) => Some(all_of([filter, constraint.as_str()])),
        (Some(filter), None) => Some(filter.to_string()),
        (None, constraint) => constraint,
    }
}

fn serialize_document<T: serde::Serialize>(id: String, value: &T) -> Result<IndexDocument, ApiError> {
    let source = serde_json::to_value(value)
        .map_err(|error| create_error("error serializing document", Some(error)))?;
    Ok(IndexDocument { id, source })
}

#[async_trait]
impl ResourceManager for IndexedResourceManager {
    async fn batch_create_generic_resources(
        &self,
        occurrences: &[Occurrence],
    ) -> Result<(), ApiError> {
        let mut documents = BTreeMap::new();
        for (resource, _) in parse_occurrence_uris(occurrences)?.into_values() {
            let id = resource.generic_resource_id();
            if documents.contains_key(&id) {
                continue;
            }
            let generic = GenericResource {
                id: id.clone(),
                name: resource.name,
                resource_type: resource.resource_type,
            };
            documents.insert(id.clone(), serialize_document(id, &generic)?);
        }

        debug!(resources = documents.len(), "indexing generic resources");
        self.index
            .bulk_create(&self.resources_alias, documents.into_values().collect())
            .await
            .map_err(|error| create_error("error creating generic resources", Some(error)))
    }

    async fn batch_create_generic_resource_versions(
        &self,
        occurrences: &[Occurrence],
    ) -> Result<(), ApiError> {
        let mut documents = Vec::new();
        for (resource, occurrence) in parse_occurrence_uris(occurrences)?.into_values() {
            let version = GenericResourceVersion {
                resource_id: resource.generic_resource_id(),
                created: Some(occurrence.create_time.unwrap_or_else(Utc::now)),
                version: resource.version,
            };
            documents.push(serialize_document(resource_version_id(&version.version), &version)?);
        }

        debug!(versions = documents.len(), "indexing generic resource versions");
        self.index
            .bulk_create(&self.versions_alias, documents)
            .await
            .map_err(|error| create_error("error creating generic resource versions", Some(error)))
    }

    async fn list_generic_resources(
        &self,
        request: &ListGenericResourcesRequest,
    ) -> Result<ListGenericResourcesResponse, ApiError> {
        let types = request.resource_types();
        let type_filter = (!types.is_empty())
            .then(|| any_of(types.iter().map(|value| format!("type == {}", quote(value)))));

        let mut list = ListRequest::new(&self.resources_alias)
            .page(request.page_size, request.page_token.clone())
            .sort(Sort::asc("name"));
        list.filter = combine(request.filter.as_deref(), type_filter);

        let page = self.engine.list(&list).await?;
        Ok(ListGenericResourcesResponse {
            generic_resources: decode_hits(page.hits)?,
            next_page_token: page.next_page_token,
        })
    }

    async fn list_generic_resource_versions(
        &self,
        request: &ListGenericResourceVersionsRequest,
    ) -> Result<ListGenericResourceVersionsResponse, ApiError> {
        let mut list = ListRequest::new(&self.versions_alias)
            .page(request.page_size, request.page_token.clone())
            .sort(Sort::desc("created"));
        list.filter = combine(
            request.filter.as_deref(),
            Some(format!("resourceId == {}", quote(&request.id))),
        );

        let page = self.engine.list(&list).await?;
        Ok(ListGenericResourceVersionsResponse {
            versions: decode_hits(page.hits)?,
            next_page_token: page.next_page_token,
        })
    }

    async fn get_generic_resource(&self, id: &str) -> Result<Option<GenericResource>, ApiError> {
        let body = SearchBody {
            query: Some(json!({ "term": { "id": id } })),
            size: Some(1),
            ..SearchBody::default()
        };
        let results = self
            .index
            .search(&self.resources_alias, &body)
            .await
            .map_err(|error| create_error("error fetching generic resource", Some(error)))?;

        Ok(decode_hits(results.hits)?.into_iter().next())
    }
}
