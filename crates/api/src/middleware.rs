use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use orglicense_auth::{TokenError, TokenVerifier};
use orglicense_core::AppError;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::CurrentUser;

#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn TokenVerifier>,
    pub services: Arc<AppServices>,
}

impl AuthState {
    /// Resolve the request's bearer token to the current user.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<CurrentUser, ApiError> {
        let token = extract_bearer(headers).ok_or_else(|| {
            AppError::unauthorized("Not authenticated", "A bearer token is required")
        })?;

        let claims = self.verifier.verify(token).map_err(|err| match err {
            TokenError::Expired => {
                AppError::unauthorized("Token expired", "The bearer token has expired")
            }
            TokenError::Invalid => {
                AppError::unauthorized("Invalid token", "The bearer token could not be verified")
            }
        })?;

        let user = self.services.identity.get_or_create(&claims).await?;
        Ok(CurrentUser(user))
    }
}

/// Require a verified identity and cache the resolved user on the request.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let current = state.authenticate(req.headers()).await?;
    req.extensions_mut().insert(current);
    Ok(next.run(req).await)
}

/// Wrap every request in a span carrying method and path, so error logs have
/// path context.
pub async fn trace_middleware(req: Request<Body>, next: Next) -> Response {
    use tracing::Instrument as _;

    let span = tracing::info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
    );
    next.run(req).instrument(span).await
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
