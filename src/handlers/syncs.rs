//! # Sync Handlers

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Principal;
use crate::error::{ApiError, not_found, validation_error};
use crate::mapping::auto_map as suggest_mappings;
use crate::models::sync::{FieldMapping, SyncStage, TableMappings};
use crate::server::AppState;

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct AutoMapRequest {
    /// Minimum similarity in `[0, 1]`; defaults to the configured threshold
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AutoMapResponse {
    pub sync_id: Uuid,
    pub stage: SyncStage,
    pub field_mappings: Vec<FieldMapping>,
}

/// Suggest and store field mappings between the sync's source and destination tables
#[utoipa::path(
    post,
    path = "/syncs/{id}/auto-map",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Sync id")),
    request_body(content = Option<AutoMapRequest>, content_type = "application/json"),
    responses(
        (status = 200, description = "Mappings stored", body = AutoMapResponse),
        (status = 400, description = "Sync has no tables selected or threshold out of range", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Sync or table not found", body = ApiError)
    ),
    tag = "syncs"
)]
pub async fn auto_map(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<Uuid>,
    request: Option<Json<AutoMapRequest>>,
) -> Result<Json<AutoMapResponse>, ApiError> {
    let request = request.map(|Json(body)| body).unwrap_or_default();
    let threshold = request.threshold.unwrap_or(state.config.auto_map_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(validation_error(
            "threshold must be between 0 and 1",
            json!({ "threshold": threshold }),
        ));
    }

    let syncs = state.syncs();
    let sync = syncs
        .get_by_id(id)
        .await?
        .ok_or_else(|| not_found("Sync", id))?;
    let (Some(source_id), Some(destination_id)) = (sync.source_table_id, sync.destination_table_id)
    else {
        return Err(validation_error(
            "Select a source and a destination table before mapping fields",
            json!({
                "source_table_id": sync.source_table_id,
                "destination_table_id": sync.destination_table_id,
            }),
        ));
    };

    let schema = state.schema();
    let source = schema
        .find_table(source_id)
        .await?
        .ok_or_else(|| not_found("Table", source_id))?;
    let destination = schema
        .find_table(destination_id)
        .await?
        .ok_or_else(|| not_found("Table", destination_id))?;

    let source_names: Vec<&str> = source.columns.iter().map(|c| c.name.as_str()).collect();
    let destination_names: Vec<&str> =
        destination.columns.iter().map(|c| c.name.as_str()).collect();
    let field_mappings = suggest_mappings(&source_names, &destination_names, threshold);

    let mappings = TableMappings {
        field_mappings,
        ..sync.mappings()
    };
    let updated = syncs
        .update_mappings(id, &mappings, SyncStage::Mappings)
        .await?;

    tracing::info!(
        sync_id = %id,
        mapped = mappings.field_mappings.len(),
        "Field mappings suggested"
    );
    Ok(Json(AutoMapResponse {
        sync_id: id,
        stage: updated.stage().unwrap_or(SyncStage::Mappings),
        field_mappings: mappings.field_mappings,
    }))
}
