use axum::{
    extract::State,
    Json,
};
use provenance_common::{protocol::api::CreateNoteQuery, types::Note};
use tracing::debug;

use super::{store_failure, ApiState};
use crate::error::{create_error_with_code, ApiError, ErrorCode, NO_CAUSE};
use crate::validation::{ValidatedJson, ValidatedQuery};

pub(super) async fn create_note(
    State(state): State<ApiState>,
    ValidatedQuery(query): ValidatedQuery<CreateNoteQuery>,
    ValidatedJson(note): ValidatedJson<Note>,
) -> Result<Json<Note>, ApiError> {
    if query.note_id.trim().is_empty() {
        return Err(create_error_with_code(
            ErrorCode::InvalidArgument,
            "note id is required",
            NO_CAUSE,
        ));
    }

    debug!(note_id = %query.note_id, "creating note");
    let note = state
        .store
        .create_note(&state.project, &query.note_id, note)
        .await
        .map_err(|error| store_failure("error creating note", error))?;

    Ok(Json(note))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::api::testing::{body_json, harness, json_request};

    #[tokio::test]
    async fn creates_notes_under_the_project() {
        let harness = harness().await;
        let response = harness
            .router
            .oneshot(json_request(
                Method::POST,
                "/v1alpha1/notes?noteId=manual-build",
                json!({ "kind": "BUILD", "shortDescription": "manual" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["name"], "projects/provenance/notes/manual-build");
        assert_eq!(body["kind"], "BUILD");
    }

    #[tokio::test]
    async fn note_id_is_required() {
        let harness = harness().await;
        let response = harness
            .router
            .oneshot(json_request(Method::POST, "/v1alpha1/notes", json!({ "kind": "BUILD" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn duplicate_notes_keep_the_store_code() {
        let harness = harness().await;
        for expected in [StatusCode::OK, StatusCode::CONFLICT] {
            let response = harness
                .router
                .clone()
                .oneshot(json_request(
                    Method::POST,
                    "/v1alpha1/notes?noteId=dup",
                    json!({ "kind": "BUILD" }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), expected);
        }
    }
}
