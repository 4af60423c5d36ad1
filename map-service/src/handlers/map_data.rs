use crate::models::{bson_to_json, StoredDocument};
use crate::startup::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use service_core::error::AppError;

#[derive(Debug, Serialize)]
pub struct ListMapDataResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<StoredDocument>,
}

#[derive(Debug, Serialize)]
pub struct SaveMapDataResponse {
    pub success: bool,
    /// The identifier assigned by the store.
    pub data: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearMapDataResponse {
    pub success: bool,
    pub deleted_count: u64,
}

#[tracing::instrument(skip(state))]
pub async fn get_map_data(
    State(state): State<AppState>,
) -> Result<Json<ListMapDataResponse>, AppError> {
    let documents = state.collection.list_all().await?;

    Ok(Json(ListMapDataResponse {
        success: true,
        count: documents.len(),
        data: documents,
    }))
}

#[tracing::instrument(skip(state, payload))]
pub async fn save_map_data(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SaveMapDataResponse>, AppError> {
    let Json(payload) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Rejected map data body");
        AppError::Validation(format!(
            "Please provide valid JSON data: {}",
            rejection.body_text()
        ))
    })?;

    let id = state.collection.insert_one(payload).await?;

    Ok(Json(SaveMapDataResponse {
        success: true,
        data: bson_to_json(id),
    }))
}

/// Deletes the whole collection.
///
/// There is no access control here; a real deployment has to put this
/// route behind its own authorization.
#[tracing::instrument(skip(state))]
pub async fn clear_map_data(
    State(state): State<AppState>,
) -> Result<Json<ClearMapDataResponse>, AppError> {
    let deleted_count = state.collection.delete_all().await?;

    Ok(Json(ClearMapDataResponse {
        success: true,
        deleted_count,
    }))
}
