use axum::{
    extract::State,
    Json,
};
use provenance_common::protocol::api::{RegisterCollectorRequest, RegisterCollectorResponse};

use super::ApiState;
use crate::error::ApiError;
use crate::validation::{ValidatedJson, ValidatedPath};

pub(super) async fn register_collector(
    State(state): State<ApiState>,
    ValidatedPath(collector_id): ValidatedPath<String>,
    ValidatedJson(request): ValidatedJson<RegisterCollectorRequest>,
) -> Result<Json<RegisterCollectorResponse>, ApiError> {
    let notes = state.registry.register(&collector_id, request.notes).await?;
    Ok(Json(RegisterCollectorResponse { notes }))
}
