use std::collections::{BTreeMap, BTreeSet};

use axum::{
    extract::State,
    Json,
};
use provenance_common::protocol::api::{
    BatchCreateOccurrencesRequest, BatchCreateOccurrencesResponse, ListOccurrencesRequest,
    ListOccurrencesResponse, ListVersionedResourceOccurrencesRequest,
    ListVersionedResourceOccurrencesResponse, UpdateOccurrenceRequest,
};
use provenance_common::types::{Note, Occurrence};
use tracing::debug;

use super::{store_failure, ApiState};
use crate::error::{create_error_with_code, ApiError, ErrorCode, NO_CAUSE};
use crate::filter::{any_of, quote};
use crate::pagination::MAX_PAGE_SIZE;
use crate::store::ListParams;
use crate::validation::{ValidatedJson, ValidatedPath, ValidatedQuery};

fn invalid_argument(message: &str) -> ApiError {
    create_error_with_code(ErrorCode::InvalidArgument, message, NO_CAUSE)
}

pub(super) async fn batch_create_occurrences(
    State(state): State<ApiState>,
    ValidatedJson(request): ValidatedJson<BatchCreateOccurrencesRequest>,
) -> Result<Json<BatchCreateOccurrencesResponse>, ApiError> {
    if request.occurrences.is_empty() {
        return Err(invalid_argument("at least one occurrence is required"));
    }
    for occurrence in &request.occurrences {
        if occurrence.resource.uri.trim().is_empty() {
            return Err(invalid_argument("occurrence resource uri is required"));
        }
        if occurrence.note_name.trim().is_empty() {
            return Err(invalid_argument("occurrence note name is required"));
        }
    }

    let occurrences = state
        .store
        .batch_create_occurrences(&state.project, request.occurrences)
        .await
        .map_err(|error| store_failure("error creating occurrences", error))?;

    state.resources.batch_create_generic_resources(&occurrences).await?;
    state.resources.batch_create_generic_resource_versions(&occurrences).await?;

    Ok(Json(BatchCreateOccurrencesResponse { occurrences }))
}

pub(super) async fn list_occurrences(
    State(state): State<ApiState>,
    ValidatedQuery(request): ValidatedQuery<ListOccurrencesRequest>,
) -> Result<Json<ListOccurrencesResponse>, ApiError> {
    let params = ListParams {
        filter: request.filter,
        page_size: request.page_size,
        page_token: request.page_token,
    };
    let page = state
        .store
        .list_occurrences(&state.project, &params)
        .await
        .map_err(|error| store_failure("error listing occurrences", error))?;

    Ok(Json(ListOccurrencesResponse {
        occurrences: page.occurrences,
        next_page_token: page.next_page_token,
    }))
}

pub(super) async fn update_occurrence(
    State(state): State<ApiState>,
    ValidatedPath(id): ValidatedPath<String>,
    ValidatedJson(request): ValidatedJson<UpdateOccurrenceRequest>,
) -> Result<Json<Occurrence>, ApiError> {
    let name = format!("{}/occurrences/{id}", state.project);
    if request.occurrence.name != name {
        return Err(invalid_argument("occurrence name does not contain the occurrence id"));
    }

    let occurrence = state
        .store
        .update_occurrence(&name, request.occurrence, request.update_mask.as_deref())
        .await
        .map_err(|error| store_failure("error updating occurrence", error))?;

    Ok(Json(occurrence))
}

/// Occurrences of a resource plus those of every artifact built from it or into it.
pub(super) async fn list_versioned_resource_occurrences(
    State(state): State<ApiState>,
    ValidatedQuery(request): ValidatedQuery<ListVersionedResourceOccurrencesRequest>,
) -> Result<Json<ListVersionedResourceOccurrencesResponse>, ApiError> {
    let resource_uri = request.resource_uri.trim();
    if resource_uri.is_empty() {
        return Err(invalid_argument("resource uri is required"));
    }

    let quoted = quote(resource_uri);
    let build_filter = format!(
        "kind == \"BUILD\" && (resource.uri == {quoted} || build.provenance.builtArtifacts.nestedFilter(id == {quoted}))"
    );
    let builds = state
        .store
        .list_occurrences(&state.project, &ListParams::filtered(build_filter).page_size(MAX_PAGE_SIZE as u32))
        .await
        .map_err(|error| store_failure("error fetching build occurrences", error))?;

    let mut uris = BTreeSet::from([resource_uri.to_string()]);
    for occurrence in &builds.occurrences {
        uris.insert(occurrence.resource.uri.clone());
        uris.extend(occurrence.built_artifact_ids().map(str::to_string));
    }
    uris.remove("");

    let filter = any_of(uris.iter().map(|uri| format!("resource.uri == {}", quote(uri))));
    debug!(%filter, "listing versioned resource occurrences");
    let params = ListParams {
        filter: Some(filter),
        page_size: request.page_size,
        page_token: request.page_token,
    };
    let page = state
        .store
        .list_occurrences(&state.project, &params)
        .await
        .map_err(|error| store_failure("error listing occurrences", error))?;

    let related_notes = if request.fetch_related_notes {
        fetch_related_notes(&state, &page.occurrences).await?
    } else {
        BTreeMap::new()
    };

    Ok(Json(ListVersionedResourceOccurrencesResponse {
        occurrences: page.occurrences,
        next_page_token: page.next_page_token,
        related_notes,
    }))
}

async fn fetch_related_notes(
    state: &ApiState,
    occurrences: &[Occurrence],
) -> Result<BTreeMap<String, Note>, ApiError> {
    let names: BTreeSet<&str> = occurrences
        .iter()
        .map(|occurrence| occurrence.note_name.as_str())
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        return Ok(BTreeMap::new());
    }

    let filter = any_of(names.iter().map(|name| format!("\"name\" == {}", quote(name))));
    let page = state
        .store
        .list_notes(&state.project, &ListParams::filtered(filter).page_size(MAX_PAGE_SIZE as u32))
        .await
        .map_err(|error| store_failure("error fetching related notes", error))?;

    Ok(page.notes.into_iter().map(|note| (note.name.clone(), note)).collect())
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api::testing::{body_json, get_request, harness, json_request, Harness};

    async fn create(harness: &Harness, occurrences: Value) -> Value {
        let response = harness
            .router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/v1alpha1/occurrences:batchCreate",
                json!({ "occurrences": occurrences }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    async fn get(harness: &Harness, uri: &str) -> (StatusCode, Value) {
        let response = harness.router.clone().oneshot(get_request(uri)).await.unwrap();
        let status = response.status();
        (status, body_json(response).await)
    }

    #[tokio::test]
    async fn batch_create_records_generic_resources() {
        let harness = harness().await;
        let body = create(
            &harness,
            json!([{
                "resource": { "uri": "pkg:npm/left-pad@1.0.0" },
                "noteName": "projects/provenance/notes/n",
                "kind": "VULNERABILITY"
            }]),
        )
        .await;

        assert!(body["occurrences"][0]["name"]
            .as_str()
            .unwrap()
            .starts_with("projects/provenance/occurrences/"));
        assert_eq!(harness.index.documents("generic-resources").await.len(), 1);
        assert_eq!(harness.index.documents("generic-resource-versions").await.len(), 1);
    }

    #[tokio::test]
    async fn batch_create_validates_occurrences() {
        let harness = harness().await;
        for occurrences in [
            json!([]),
            json!([{ "resource": { "uri": "" }, "noteName": "n" }]),
            json!([{ "resource": { "uri": "git://a@b" }, "noteName": "" }]),
        ] {
            let response = harness
                .router
                .clone()
                .oneshot(json_request(
                    Method::POST,
                    "/v1alpha1/occurrences:batchCreate",
                    json!({ "occurrences": occurrences }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        assert!(harness.store.occurrences().await.is_empty());
    }

    #[tokio::test]
    async fn list_occurrences_passes_filter_through() {
        let harness = harness().await;
        create(
            &harness,
            json!([
                { "resource": { "uri": "git://a@1" }, "noteName": "n", "kind": "BUILD" },
                { "resource": { "uri": "git://b@1" }, "noteName": "n", "kind": "VULNERABILITY" }
            ]),
        )
        .await;

        let (status, body) =
            get(&harness, "/v1alpha1/occurrences?filter=kind%20%3D%3D%20%22BUILD%22").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["occurrences"].as_array().unwrap().len(), 1);
        assert_eq!(body["occurrences"][0]["resource"]["uri"], "git://a@1");

        let (status, body) = get(&harness, "/v1alpha1/occurrences?filter=kind%20%3D%3D").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn update_requires_matching_name() {
        let harness = harness().await;
        let created =
            create(&harness, json!([{ "resource": { "uri": "git://a@1" }, "noteName": "n" }])).await;
        let name = created["occurrences"][0]["name"].as_str().unwrap().to_string();
        let id = name.rsplit('/').next().unwrap().to_string();

        let mismatched = harness
            .router
            .clone()
            .oneshot(json_request(
                Method::PATCH,
                "/v1alpha1/occurrences/other",
                json!({ "occurrence": { "name": name, "resource": { "uri": "git://a@2" }, "noteName": "n" } }),
            ))
            .await
            .unwrap();
        assert_eq!(mismatched.status(), StatusCode::BAD_REQUEST);

        let updated = harness
            .router
            .clone()
            .oneshot(json_request(
                Method::PATCH,
                &format!("/v1alpha1/occurrences/{id}"),
                json!({ "occurrence": { "name": name, "resource": { "uri": "git://a@2" }, "noteName": "n" } }),
            ))
            .await
            .unwrap();
        assert_eq!(updated.status(), StatusCode::OK);
        assert_eq!(body_json(updated).await["resource"]["uri"], "git://a@2");
    }

    #[tokio::test]
    async fn versioned_resource_occurrences_follow_build_artifacts() {
        let harness = harness().await;
        create(
            &harness,
            json!([
                {
                    "resource": { "uri": "git://github.com/org/repo@abc" },
                    "noteName": "projects/provenance/notes/build",
                    "kind": "BUILD",
                    "build": { "provenance": { "builtArtifacts": [{ "id": "docker.io/org/app@sha256:1" }] } }
                },
                {
                    "resource": { "uri": "docker.io/org/app@sha256:1" },
                    "noteName": "projects/provenance/notes/scan",
                    "kind": "VULNERABILITY"
                },
                {
                    "resource": { "uri": "docker.io/org/other@sha256:2" },
                    "noteName": "projects/provenance/notes/scan",
                    "kind": "VULNERABILITY"
                }
            ]),
        )
        .await;
        for note_id in ["build", "scan"] {
            harness
                .router
                .clone()
                .oneshot(json_request(
                    Method::POST,
                    &format!("/v1alpha1/notes?noteId={note_id}"),
                    json!({ "kind": "BUILD" }),
                ))
                .await
                .unwrap();
        }

        let (status, body) = get(
            &harness,
            "/v1alpha1/versioned-resource-occurrences?resourceUri=docker.io%2Forg%2Fapp%40sha256%3A1&fetchRelatedNotes=true",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let mut uris: Vec<_> = body["occurrences"]
            .as_array()
            .unwrap()
            .iter()
            .map(|occurrence| occurrence["resource"]["uri"].as_str().unwrap().to_string())
            .collect();
        uris.sort();
        assert_eq!(uris, vec!["docker.io/org/app@sha256:1", "git://github.com/org/repo@abc"]);

        let notes = body["relatedNotes"].as_object().unwrap();
        assert!(notes.contains_key("projects/provenance/notes/build"));
        assert!(notes.contains_key("projects/provenance/notes/scan"));
    }

    #[tokio::test]
    async fn versioned_resource_occurrences_require_a_uri() {
        let harness = harness().await;
        let (status, body) = get(&harness, "/v1alpha1/versioned-resource-occurrences").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "resource uri is required");
    }
}
