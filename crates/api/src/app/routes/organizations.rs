use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;

use orglicense_core::{InvitationId, LicenseId, OrgId, PageRequest, UserId};

use crate::app::routes::common::parse_role;
use crate::app::services::AppServices;
use crate::app::{dto, errors::ApiError};
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_organization).get(list_my_organizations))
        .route(
            "/:org_id",
            get(get_organization)
                .put(update_organization)
                .delete(delete_organization),
        )
        .route("/:org_id/invite", post(invite_user))
        .route("/:org_id/invitations", get(list_invitations))
        .route(
            "/:org_id/invitations/:invitation_id",
            get(get_invitation).delete(cancel_invitation),
        )
        .route("/:org_id/users", get(list_members))
        .route("/:org_id/users/:user_id", get(get_member))
        .route("/:org_id/users/:user_id/role", put(update_member_role))
        .route("/:org_id/users/:user_id/remove", post(remove_member))
        .route(
            "/:org_id/users/:user_id/license",
            post(assign_license).delete(unassign_license),
        )
        .route("/:org_id/licenses", get(list_licenses))
}

async fn create_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<dto::CreateOrganizationRequest>,
) -> Result<Response, ApiError> {
    let org = services
        .orgs
        .create(&body.name, body.description.as_deref(), &user)
        .await?;
    // The creator is the sole member at this point.
    let response = dto::organization_response(&org, 1);
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

async fn list_my_organizations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response, ApiError> {
    let records = services.orgs.list_for_user(&user).await?;
    let response: Vec<_> = records
        .iter()
        .map(|r| dto::organization_response(&r.organization, r.member_count))
        .collect();
    Ok(Json(response).into_response())
}

async fn get_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(org_id): Path<String>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let (org, member_count) = services.orgs.get_for_member(org_id, &user).await?;
    Ok(Json(dto::organization_response(&org, member_count)).into_response())
}

async fn update_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(org_id): Path<String>,
    Json(body): Json<dto::UpdateOrganizationRequest>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let (org, member_count) = services
        .orgs
        .update(org_id, &body.name, body.description.as_deref(), &user)
        .await?;
    Ok(Json(dto::organization_response(&org, member_count)).into_response())
}

async fn delete_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(org_id): Path<String>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    services.orgs.delete(org_id, &user).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn invite_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(org_id): Path<String>,
    Json(body): Json<dto::CreateInvitationRequest>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let role = parse_role(&body.role)?;
    let (invitation, org) = services
        .invitations
        .create(org_id, &body.email, role, &user)
        .await?;
    let response = dto::invitation_response(&invitation, &org.name);
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

async fn list_invitations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(org_id): Path<String>,
    Query(pagination): Query<PageRequest>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let (page, org) = services.invitations.list(org_id, &user, pagination).await?;
    let response = page.map(|i| dto::invitation_response(&i, &org.name));
    Ok(Json(response).into_response())
}

async fn get_invitation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((org_id, invitation_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let invitation_id: InvitationId = invitation_id.parse()?;
    let (invitation, org) = services
        .invitations
        .get(org_id, invitation_id, &user)
        .await?;
    Ok(Json(dto::invitation_response(&invitation, &org.name)).into_response())
}

async fn cancel_invitation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((org_id, invitation_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let invitation_id: InvitationId = invitation_id.parse()?;
    services
        .invitations
        .cancel(org_id, invitation_id, &user)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_members(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(org_id): Path<String>,
    Query(pagination): Query<PageRequest>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let page = services.orgs.list_members(org_id, &user, pagination).await?;
    let now = Utc::now();
    let response = page.map(|record| dto::member_response(&record, now));
    Ok(Json(response).into_response())
}

async fn get_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((org_id, user_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let user_id: UserId = user_id.parse()?;
    let record = services.orgs.get_member(org_id, user_id, &user).await?;
    Ok(Json(dto::member_response(&record, Utc::now())).into_response())
}

async fn update_member_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((org_id, user_id)): Path<(String, String)>,
    Json(body): Json<dto::UpdateMemberRoleRequest>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let user_id: UserId = user_id.parse()?;
    let role = parse_role(&body.role)?;
    services
        .orgs
        .update_member_role(org_id, user_id, role, &user)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn remove_member(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((org_id, user_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let user_id: UserId = user_id.parse()?;
    services.orgs.remove_member(org_id, user_id, &user).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn assign_license(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((org_id, user_id)): Path<(String, String)>,
    Json(body): Json<dto::AssignLicenseRequest>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let user_id: UserId = user_id.parse()?;
    let license_id = LicenseId::from_uuid(body.license_id);
    services
        .licenses
        .assign(org_id, user_id, license_id, &user)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn unassign_license(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((org_id, user_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let user_id: UserId = user_id.parse()?;
    services.licenses.unassign(org_id, user_id, &user).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_licenses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(org_id): Path<String>,
    Query(pagination): Query<PageRequest>,
) -> Result<Response, ApiError> {
    let org_id: OrgId = org_id.parse()?;
    let page = services
        .licenses
        .list_for_org(org_id, &user, pagination)
        .await?;
    Ok(Json(dto::license_page_response(page, Utc::now())).into_response())
}
