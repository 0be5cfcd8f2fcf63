use axum::{
    extract::State,
    Json,
};
use provenance_common::protocol::api::{
    ListGenericResourceVersionsRequest, ListGenericResourceVersionsResponse,
    ListGenericResourcesRequest, ListGenericResourcesResponse, ListResourcesRequest,
    ListResourcesResponse,
};
use provenance_common::types::Occurrence;
use tracing::debug;

use super::ApiState;
use crate::error::{create_error_with_code, ApiError, ErrorCode, NO_CAUSE};
use crate::pagination::decode_hits;
use crate::query::ListRequest;
use crate::search::Sort;
use crate::validation::{ValidatedPath, ValidatedQuery};

const RESOURCE_URI_FIELD: &str = "resource.uri";

/// Distinct resources with occurrences, ordered by URI.
pub(super) async fn list_resources(
    State(state): State<ApiState>,
    ValidatedQuery(request): ValidatedQuery<ListResourcesRequest>,
) -> Result<Json<ListResourcesResponse>, ApiError> {
    let mut list = ListRequest::new(&*state.occurrences_alias)
        .page(request.page_size, request.page_token)
        .sort(Sort::asc(RESOURCE_URI_FIELD))
        .collapse(RESOURCE_URI_FIELD);
    list.filter = request.filter;

    let page = state.engine.list(&list).await?;
    let occurrences: Vec<Occurrence> = decode_hits(page.hits)?;

    Ok(Json(ListResourcesResponse {
        resources: occurrences.into_iter().map(|occurrence| occurrence.resource).collect(),
        next_page_token: page.next_page_token,
    }))
}

pub(super) async fn list_generic_resources(
    State(state): State<ApiState>,
    ValidatedQuery(request): ValidatedQuery<ListGenericResourcesRequest>,
) -> Result<Json<ListGenericResourcesResponse>, ApiError> {
    Ok(Json(state.resources.list_generic_resources(&request).await?))
}

pub(super) async fn list_generic_resource_versions(
    State(state): State<ApiState>,
    ValidatedPath(id): ValidatedPath<String>,
    ValidatedQuery(mut request): ValidatedQuery<ListGenericResourceVersionsRequest>,
) -> Result<Json<ListGenericResourceVersionsResponse>, ApiError> {
    if id.trim().is_empty() {
        return Err(create_error_with_code(
            ErrorCode::InvalidArgument,
            "resource id is required",
            NO_CAUSE,
        ));
    }

    if state.resources.get_generic_resource(&id).await?.is_none() {
        debug!(%id, "generic resource not found");
        return Err(create_error_with_code(
            ErrorCode::NotFound,
            &format!("generic resource with id {id} not found"),
            NO_CAUSE,
        ));
    }

    request.id = id;
    Ok(Json(state.resources.list_generic_resource_versions(&request).await?))
}
