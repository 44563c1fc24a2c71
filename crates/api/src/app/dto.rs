//! Request/response DTOs and mapping from domain types.
//!
//! Wire casing is camelCase throughout, matching the documented client
//! contract; internal types stay idiomatic Rust.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use orglicense_core::Page;
use orglicense_directory::{Invitation, Membership, Organization};
use orglicense_infra::{LicenseRecord, MemberRecord, UserOrgRecord};
use orglicense_licensing::License;

// ─── Requests ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrganizationRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvitationRequest {
    pub email: String,
    #[serde(default = "default_invite_role")]
    pub role: String,
}

fn default_invite_role() -> String {
    "Member".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInvitationRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemberRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignLicenseRequest {
    pub license_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLicenseRequest {
    #[serde(default)]
    pub auto_renewal: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLicenseRequest {
    pub expires_at: Option<DateTime<Utc>>,
    pub auto_renewal: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLicenseSettingsRequest {
    pub expiration_minutes: i64,
}

// ─── Responses ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub member_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOrganizationResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationResponse {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub organization_name: String,
    pub email: String,
    pub token: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
    pub invited_by_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseInfo {
    pub id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub is_expired: bool,
    pub auto_renewal: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub license: Option<LicenseInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseResponse {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub assigned_to_user_id: Option<Uuid>,
    pub assigned_to_email: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub auto_renewal: bool,
    pub is_active: bool,
    pub is_expired: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSettingsResponse {
    pub expiration_minutes: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimsResponse {
    pub user_id: String,
    pub email: String,
    pub role: String,
}

// ─── Mapping ─────────────────────────────────────────────────────────────

pub fn organization_response(org: &Organization, member_count: u64) -> OrganizationResponse {
    OrganizationResponse {
        id: (*org.id.as_uuid()),
        name: org.name.clone(),
        description: org.description.clone(),
        created_at: org.created_at,
        updated_at: org.updated_at,
        member_count,
    }
}

pub fn user_organization_response(record: &UserOrgRecord) -> UserOrganizationResponse {
    UserOrganizationResponse {
        id: (*record.organization.id.as_uuid()),
        name: record.organization.name.clone(),
        description: record.organization.description.clone(),
        role: record.membership.role.to_string(),
        joined_at: record.membership.joined_at,
    }
}

pub fn membership_response(
    membership: &Membership,
    organization: &Organization,
) -> UserOrganizationResponse {
    UserOrganizationResponse {
        id: (*organization.id.as_uuid()),
        name: organization.name.clone(),
        description: organization.description.clone(),
        role: membership.role.to_string(),
        joined_at: membership.joined_at,
    }
}

pub fn invitation_response(invitation: &Invitation, org_name: &str) -> InvitationResponse {
    InvitationResponse {
        id: (*invitation.id.as_uuid()),
        organization_id: (*invitation.org_id.as_uuid()),
        organization_name: org_name.to_string(),
        email: invitation.email.clone(),
        token: invitation.token.clone(),
        role: invitation.role.to_string(),
        expires_at: invitation.expires_at,
        invited_by_user_id: invitation.invited_by.map(|id| *id.as_uuid()),
        created_at: invitation.created_at,
    }
}

pub fn member_response(record: &MemberRecord, now: DateTime<Utc>) -> MemberResponse {
    MemberResponse {
        user_id: (*record.user.id.as_uuid()),
        email: record.user.email.clone(),
        role: record.membership.role.to_string(),
        joined_at: record.membership.joined_at,
        license: record.license.as_ref().map(|l| LicenseInfo {
            id: (*l.id.as_uuid()),
            expires_at: l.expires_at,
            is_expired: l.is_expired(now),
            auto_renewal: l.auto_renewal,
        }),
    }
}

pub fn license_response(
    license: &License,
    assignee_email: Option<&str>,
    now: DateTime<Utc>,
) -> LicenseResponse {
    LicenseResponse {
        id: (*license.id.as_uuid()),
        organization_id: (*license.org_id.as_uuid()),
        assigned_to_user_id: license.assigned_to.map(|id| *id.as_uuid()),
        assigned_to_email: assignee_email.map(str::to_string),
        expires_at: license.expires_at,
        auto_renewal: license.auto_renewal,
        is_active: license.is_active,
        is_expired: license.is_expired(now),
        created_at: license.created_at,
        updated_at: license.updated_at,
    }
}

pub fn license_record_response(record: &LicenseRecord, now: DateTime<Utc>) -> LicenseResponse {
    license_response(&record.license, record.assignee_email.as_deref(), now)
}

pub fn license_page_response(
    page: Page<LicenseRecord>,
    now: DateTime<Utc>,
) -> Page<LicenseResponse> {
    page.map(|record| license_record_response(&record, now))
}
