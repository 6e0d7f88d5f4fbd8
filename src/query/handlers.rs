//! Axum handlers for the query routes.

use axum::extract::{Path, RawQuery, State};
use axum::Json;

use crate::http::response::ApiError;
use crate::query::service::{parse_page, ListResponse, QueryApi, RecordDetail};

/// `GET /api/requests`
pub async fn list_requests(
    State(api): State<QueryApi>,
    RawQuery(raw): RawQuery,
) -> Result<Json<ListResponse>, ApiError> {
    let page = parse_page(raw.as_deref());
    api.list(page).await.map(Json).map_err(|e| {
        tracing::error!(error = %e, "Failed to list captured requests");
        ApiError::Internal("failed to load requests")
    })
}

/// `GET /api/requests/{id}`
pub async fn get_request(
    State(api): State<QueryApi>,
    Path(id): Path<String>,
) -> Result<Json<RecordDetail>, ApiError> {
    match api.get(&id).await {
        Ok(Some(detail)) => Ok(Json(detail)),
        Ok(None) => Err(ApiError::NotFound("request not found")),
        Err(e) => {
            tracing::error!(error = %e, request_id = %id, "Failed to load captured request");
            Err(ApiError::Internal("failed to load request"))
        }
    }
}
