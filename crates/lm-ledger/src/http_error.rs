//! Maps [`LedgerError`] onto the status codes spec.md §7 specifies.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lm_types::error::LedgerError;
use serde_json::json;

pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            LedgerError::Validation { field, message } => {
                (StatusCode::BAD_REQUEST, format!("{field}: {message}"))
            }
            LedgerError::Conflict(message) => (StatusCode::CONFLICT, message.clone()),
            LedgerError::NotFound { entity, id } => {
                (StatusCode::NOT_FOUND, format!("{entity} {id} not found"))
            }
            LedgerError::Unauthorized => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            LedgerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.0.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
