//! Consistent error responses.
//!
//! Business errors become problem-details-style JSON with the matching
//! status; anything unexpected becomes a generic 500 whose cause goes only to
//! the logs. Expected client errors log at warn, the rest at error; the
//! request span supplies method and path context.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use orglicense_core::AppError;

/// Newtype so `AppError` can cross the axum boundary via `?`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if let AppError::Internal(cause) = &err {
            tracing::error!(error = ?cause, "unhandled error");
        } else {
            tracing::warn!(
                status = status.as_u16(),
                title = err.title(),
                detail = err.detail(),
                "client error"
            );
        }

        (
            status,
            Json(json!({
                "status": status.as_u16(),
                "title": err.title(),
                "detail": err.detail(),
            })),
        )
            .into_response()
    }
}
