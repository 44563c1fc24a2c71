//! HTTP application wiring (axum router + service wiring).
//!
//! Layout:
//! - `services.rs`: manager wiring over the shared store
//! - `routes/`: HTTP routes + handlers (one file per resource area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

use orglicense_auth::Hs256TokenVerifier;
use orglicense_infra::Store;

use crate::middleware::{self, AuthState};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router over an already-connected store.
///
/// Returns the services alongside so the binary can hand them to the
/// background sweeper; tests typically use only the router.
pub async fn build_app(jwt_secret: String, store: Arc<dyn Store>) -> (Router, Arc<services::AppServices>) {
    let services = Arc::new(services::build_services(store).await);
    let auth_state = AuthState {
        verifier: Arc::new(Hs256TokenVerifier::new(jwt_secret.as_bytes())),
        services: Arc::clone(&services),
    };

    // Everything under /api except the invite link requires a bearer
    // identity.
    let protected = routes::router()
        .layer(Extension(Arc::clone(&services)))
        .layer(axum::middleware::from_fn_with_state(
            auth_state.clone(),
            middleware::auth_middleware,
        ));

    // The invite link renders human-facing HTML and handles the missing
    // identity itself, so it lives outside the auth layer.
    let public = Router::new()
        .route(
            "/invitations/accept",
            get(routes::invite_link::accept_via_link),
        )
        .layer(Extension(auth_state));

    let app = Router::new()
        .route("/health", get(routes::system::health))
        .merge(public)
        .nest("/api", protected)
        .layer(axum::middleware::from_fn(middleware::trace_middleware));

    (app, services)
}
