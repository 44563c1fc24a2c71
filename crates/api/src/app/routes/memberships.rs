use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use orglicense_core::OrgId;

use crate::app::services::AppServices;
use crate::app::{dto, errors::ApiError};
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_my_memberships))
        .route("/invitations/accept", post(accept_invitation))
        .route("/:org_id", get(get_my_membership).delete(leave_organization))
}

async fn list_my_memberships(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response, ApiError> {
    let records = services.orgs.list_for_user(&user).await?;
    let response: Vec<_> = records.iter().map(dto::user_organization_response).collect();
    Ok(Json(response).into_response())
}

async fn get_my_membership(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(org_id): Path<String>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let record = services.orgs.my_membership(org_id, &user).await?;
    Ok(Json(dto::user_organization_response(&record)).into_response())
}

async fn leave_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(org_id): Path<String>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    services.orgs.leave(org_id, &user).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn accept_invitation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<dto::AcceptInvitationRequest>,
) -> Result<Response, ApiError> {
    let (membership, organization) = services.invitations.accept(&body.token, &user).await?;
    let response = dto::membership_response(&membership, &organization);
    Ok((StatusCode::CREATED, Json(response)).into_response())
}
