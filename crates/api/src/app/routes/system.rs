use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::dto::ClaimsResponse;
use crate::context::CurrentUser;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Echo the verified identity back to the caller.
pub async fn claims(Extension(CurrentUser(user)): Extension<CurrentUser>) -> impl IntoResponse {
    Json(ClaimsResponse {
        user_id: user.external_id.clone(),
        email: user.email.clone(),
        role: user.platform_role.to_string(),
    })
}
