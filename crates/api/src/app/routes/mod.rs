use axum::{routing::get, Router};

pub mod admin;
pub mod common;
pub mod invite_link;
pub mod memberships;
pub mod organizations;
pub mod system;

/// Router for all authenticated endpoints (nested under `/api`).
pub fn router() -> Router {
    Router::new()
        .route("/auth/claims", get(system::claims))
        .nest("/organizations", organizations::router())
        .nest("/memberships", memberships::router())
        .nest("/admin/licenses", admin::router())
}
