//! Store traits and shared error mapping.
//!
//! Each method is one atomic unit against the backing store: the in-memory
//! implementation serializes everything behind one lock, the Postgres
//! implementation runs one transaction per call. Guards that must hold under
//! concurrency (license already assigned elsewhere, last remaining owner) are
//! re-checked inside the implementation, not only by the calling service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use orglicense_auth::OrgRole;
use orglicense_core::{
    AppError, InvitationId, LicenseId, OrgId, Page, PageRequest, UserId,
};
use orglicense_directory::{Invitation, Membership, Organization, User};
use orglicense_licensing::License;

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("membership already exists")]
    DuplicateMembership,

    #[error("a pending invitation already exists for this email")]
    DuplicateInvitation,

    #[error("license is already assigned to another user")]
    AlreadyAssigned,

    #[error("member already holds a different license")]
    AlreadyHeld,

    #[error("organization must retain at least one owner")]
    LastOwner,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    /// Default mapping; services override variants that need a
    /// context-specific title or detail.
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => {
                AppError::not_found("Not found", "The requested resource does not exist")
            }
            StoreError::DuplicateMembership => AppError::bad_request(
                "Already a member",
                "You are already a member of this organization",
            ),
            StoreError::DuplicateInvitation => AppError::bad_request(
                "Invitation exists",
                "An invitation has already been sent to this email",
            ),
            StoreError::AlreadyAssigned => AppError::bad_request(
                "License already assigned",
                "This license is already assigned to another user",
            ),
            StoreError::AlreadyHeld => AppError::bad_request(
                "Member already holds a license",
                "Unassign the member's current license first",
            ),
            StoreError::LastOwner => AppError::bad_request(
                "At least one owner required",
                "Organization must have at least one owner",
            ),
            StoreError::Backend(err) => AppError::Internal(err),
        }
    }
}

/// A membership joined with its user and any held license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRecord {
    pub membership: Membership,
    pub user: User,
    pub license: Option<License>,
}

/// A license joined with its assignee's email, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRecord {
    pub license: License,
    pub assignee_email: Option<String>,
}

/// A membership joined with its organization and that org's member count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserOrgRecord {
    pub membership: Membership,
    pub organization: Organization,
    pub member_count: u64,
}

#[async_trait]
pub trait UserStore {
    async fn find_user_by_external_id(&self, external_id: &str) -> StoreResult<Option<User>>;

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Insert or fully replace the record with this id.
    async fn upsert_user(&self, user: &User) -> StoreResult<()>;
}

#[async_trait]
pub trait OrgStore {
    /// Create the organization together with its sole Owner membership.
    async fn insert_org_with_owner(
        &self,
        org: &Organization,
        owner: &Membership,
    ) -> StoreResult<()>;

    async fn find_org(&self, id: OrgId) -> StoreResult<Option<Organization>>;

    async fn update_org(&self, org: &Organization) -> StoreResult<()>;

    /// Delete the organization and cascade to memberships, licenses, and
    /// invitations.
    async fn delete_org(&self, id: OrgId) -> StoreResult<()>;

    async fn member_count(&self, org_id: OrgId) -> StoreResult<u64>;
}

#[async_trait]
pub trait MembershipStore {
    async fn find_membership(&self, org_id: OrgId, user_id: UserId)
        -> StoreResult<Option<Membership>>;

    /// All organizations a user belongs to, newest membership first.
    async fn orgs_for_user(&self, user_id: UserId) -> StoreResult<Vec<UserOrgRecord>>;

    /// Change a member's role. Fails with [`StoreError::LastOwner`] if this
    /// would demote the only remaining Owner.
    async fn update_member_role(
        &self,
        org_id: OrgId,
        user_id: UserId,
        role: OrgRole,
    ) -> StoreResult<()>;

    /// Remove a membership, unassigning any held license. Fails with
    /// [`StoreError::LastOwner`] if the member is the only remaining Owner.
    async fn remove_membership(&self, org_id: OrgId, user_id: UserId) -> StoreResult<()>;

    /// Sort fields: email, role, joinedat (default). Search: user email.
    async fn list_members(
        &self,
        org_id: OrgId,
        request: &PageRequest,
    ) -> StoreResult<Page<MemberRecord>>;

    async fn find_member(&self, org_id: OrgId, user_id: UserId)
        -> StoreResult<Option<MemberRecord>>;
}

#[async_trait]
pub trait InvitationStore {
    async fn insert_invitation(&self, invitation: &Invitation) -> StoreResult<()>;

    async fn find_invitation(
        &self,
        org_id: OrgId,
        id: InvitationId,
    ) -> StoreResult<Option<Invitation>>;

    async fn find_invitation_by_token(&self, token: &str) -> StoreResult<Option<Invitation>>;

    /// Idempotent; deleting an already-deleted invitation is not an error.
    async fn delete_invitation(&self, id: InvitationId) -> StoreResult<()>;

    async fn pending_exists_for_email(&self, org_id: OrgId, email: &str) -> StoreResult<bool>;

    /// Whether any current member of the org has this (normalized) email.
    async fn member_email_exists(&self, org_id: OrgId, email: &str) -> StoreResult<bool>;

    /// Sort fields: email, role, createdat (default), expiresat. Search: email.
    async fn list_invitations(
        &self,
        org_id: OrgId,
        request: &PageRequest,
    ) -> StoreResult<Page<Invitation>>;

    /// Atomically create the membership and delete the invitation; both
    /// happen or neither does.
    async fn accept_invitation(
        &self,
        invitation_id: InvitationId,
        membership: &Membership,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait LicenseStore {
    async fn insert_license(&self, license: &License) -> StoreResult<()>;

    async fn find_license(&self, id: LicenseId) -> StoreResult<Option<License>>;

    async fn update_license(&self, license: &License) -> StoreResult<()>;

    /// Atomically link the license to the member, setting both sides of the
    /// one-to-one edge. Re-checks inside the same transaction that the
    /// license is not held by a different user ([`StoreError::AlreadyAssigned`])
    /// and that the member does not hold a different license
    /// ([`StoreError::AlreadyHeld`]). Re-assigning the same pair is a no-op.
    async fn assign_license(
        &self,
        org_id: OrgId,
        user_id: UserId,
        license_id: LicenseId,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Clear both sides of the member's license link; safe no-op when
    /// nothing is assigned.
    async fn unassign_member_license(
        &self,
        org_id: OrgId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Sort fields: createdat (default), expiresat, isactive, autorenewal.
    /// Search: assignee email.
    async fn list_licenses_for_org(
        &self,
        org_id: OrgId,
        request: &PageRequest,
    ) -> StoreResult<Page<LicenseRecord>>;

    /// Cross-organization listing. Adds sort field organizationid; search
    /// also matches the organization name.
    async fn list_all_licenses(&self, request: &PageRequest) -> StoreResult<Page<LicenseRecord>>;

    /// Extend every active, auto-renewing license with `expires_at <= now`
    /// by `expiration_minutes`, bumping `updated_at`, in one atomic batch.
    /// Returns the renewed licenses.
    async fn renew_expired_licenses(
        &self,
        expiration_minutes: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<License>>;
}

#[async_trait]
pub trait SettingStore {
    async fn get_setting(&self, key: &str) -> StoreResult<Option<String>>;

    async fn put_setting(&self, key: &str, value: &str) -> StoreResult<()>;
}

/// The full relational store the services operate against.
pub trait Store:
    UserStore
    + OrgStore
    + MembershipStore
    + InvitationStore
    + LicenseStore
    + SettingStore
    + Send
    + Sync
    + 'static
{
}

impl<T> Store for T where
    T: UserStore
        + OrgStore
        + MembershipStore
        + InvitationStore
        + LicenseStore
        + SettingStore
        + Send
        + Sync
        + 'static
{
}
