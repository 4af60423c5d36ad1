use crate::services::StoreConnector;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use std::sync::Arc;

/// Rejects the request with 503 unless the store connection is ready.
///
/// Checked per request; nothing about readiness is cached.
pub async fn require_store_ready(
    State(connector): State<Arc<StoreConnector>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !connector.is_ready() {
        tracing::warn!(
            path = %request.uri().path(),
            state = %connector.state(),
            "Rejecting request: store not ready"
        );
        return Err(AppError::ServiceUnavailable(
            "Database connection not ready".to_string(),
        ));
    }

    Ok(next.run(request).await)
}
