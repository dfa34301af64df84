use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use droplets_core::error::DomainError;
use serde_json::json;

/// Wraps `DomainError` so handlers can use `?` and still produce the
/// right HTTP status.
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.status_class() {
            "bad_request" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            "upstream_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            "data_inconsistent" => StatusCode::CONFLICT,
            "retry" => StatusCode::SERVICE_UNAVAILABLE,
            "conflict" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
