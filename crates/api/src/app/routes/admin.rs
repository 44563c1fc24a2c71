//! Cross-organization license administration.
//!
//! Every endpoint here requires the platform Admin role from the verified
//! claims, independent of any organization membership.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;

use orglicense_core::{LicenseId, OrgId, PageRequest};

use crate::app::routes::common::require_platform_admin;
use crate::app::services::AppServices;
use crate::app::{dto, errors::ApiError};
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_all_licenses))
        .route("/organizations/:org_id", post(create_license))
        .route("/settings", get(get_settings).put(update_settings))
        .route("/:license_id", put(update_license).delete(cancel_license))
}

async fn create_license(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(org_id): Path<String>,
    Json(body): Json<dto::CreateLicenseRequest>,
) -> Result<Response, ApiError> {
    require_platform_admin(&user)?;
    let org_id: OrgId = org_id.parse()?;
    let license = services.licenses.create(org_id, body.auto_renewal).await?;
    let response = dto::license_response(&license, None, Utc::now());
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

async fn list_all_licenses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(pagination): Query<PageRequest>,
) -> Result<Response, ApiError> {
    require_platform_admin(&user)?;
    let page = services.licenses.list_all(pagination).await?;
    Ok(Json(dto::license_page_response(page, Utc::now())).into_response())
}

async fn update_license(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(license_id): Path<String>,
    Json(body): Json<dto::UpdateLicenseRequest>,
) -> Result<Response, ApiError> {
    require_platform_admin(&user)?;
    let license_id: LicenseId = license_id.parse()?;
    let record = services
        .licenses
        .update(license_id, body.expires_at, body.auto_renewal)
        .await?;
    Ok(Json(dto::license_record_response(&record, Utc::now())).into_response())
}

async fn cancel_license(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(license_id): Path<String>,
) -> Result<Response, ApiError> {
    require_platform_admin(&user)?;
    let license_id: LicenseId = license_id.parse()?;
    services.licenses.cancel(license_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn get_settings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response, ApiError> {
    require_platform_admin(&user)?;
    let response = dto::LicenseSettingsResponse {
        expiration_minutes: services.licenses.settings().minutes(),
    };
    Ok(Json(response).into_response())
}

async fn update_settings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<dto::UpdateLicenseSettingsRequest>,
) -> Result<Response, ApiError> {
    require_platform_admin(&user)?;
    let minutes = services
        .licenses
        .settings()
        .set_minutes(body.expiration_minutes)?;
    Ok(Json(dto::LicenseSettingsResponse {
        expiration_minutes: minutes,
    })
    .into_response())
}
