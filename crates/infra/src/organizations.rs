//! Organization and membership operations.
//!
//! Every org-scoped mutation consults the role policy before touching the
//! store; the store re-checks the owner-count invariant inside the same
//! transaction that performs the write.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use orglicense_auth::{require_grantable_role, require_min_role, OrgRole};
use orglicense_core::{AppError, AppResult, OrgId, Page, PageRequest, UserId};
use orglicense_directory::{Membership, Organization, User};

use crate::store::{MemberRecord, Store, StoreError, UserOrgRecord};

#[derive(Clone)]
pub struct OrganizationService {
    store: Arc<dyn Store>,
}

impl OrganizationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn org_not_found(org_id: OrgId) -> AppError {
        AppError::not_found(
            "Organization not found",
            format!("Organization with ID {org_id} does not exist"),
        )
    }

    fn member_not_found() -> AppError {
        AppError::not_found(
            "Member not found",
            "The specified user is not a member of this organization",
        )
    }

    async fn require_org(&self, org_id: OrgId) -> AppResult<Organization> {
        self.store
            .find_org(org_id)
            .await?
            .ok_or_else(|| Self::org_not_found(org_id))
    }

    async fn role_of(&self, org_id: OrgId, user_id: UserId) -> AppResult<Option<OrgRole>> {
        Ok(self
            .store
            .find_membership(org_id, user_id)
            .await?
            .map(|m| m.role))
    }

    /// Owner/Admin gate used by every org-scoped mutation.
    async fn require_admin(&self, org_id: OrgId, caller: &User) -> AppResult<OrgRole> {
        let role = self.role_of(org_id, caller.id).await?;
        Ok(require_min_role(role, OrgRole::Admin)?)
    }

    /// Create the organization; the creator becomes its sole Owner
    /// atomically with creation.
    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        creator: &User,
    ) -> AppResult<Organization> {
        let now = Utc::now();
        let org = Organization::create(name, description, now)?;
        let owner = Membership::new(org.id, creator.id, OrgRole::Owner, now);
        self.store.insert_org_with_owner(&org, &owner).await?;
        info!(org_id = %org.id, creator = %creator.id, "created organization");
        Ok(org)
    }

    pub async fn update(
        &self,
        org_id: OrgId,
        name: &str,
        description: Option<&str>,
        caller: &User,
    ) -> AppResult<(Organization, u64)> {
        let mut org = self.require_org(org_id).await?;
        self.require_admin(org_id, caller).await?;
        org.update(name, description, Utc::now())?;
        self.store.update_org(&org).await?;
        let member_count = self.store.member_count(org_id).await?;
        Ok((org, member_count))
    }

    /// Delete the organization, cascading memberships, licenses, and
    /// invitations.
    pub async fn delete(&self, org_id: OrgId, caller: &User) -> AppResult<()> {
        self.require_org(org_id).await?;
        self.require_admin(org_id, caller).await?;
        self.store.delete_org(org_id).await?;
        info!(org_id = %org_id, caller = %caller.id, "deleted organization");
        Ok(())
    }

    /// Fetch one organization; any member may read it.
    pub async fn get_for_member(
        &self,
        org_id: OrgId,
        caller: &User,
    ) -> AppResult<(Organization, u64)> {
        let org = self.require_org(org_id).await?;
        require_min_role(self.role_of(org_id, caller.id).await?, OrgRole::Member)?;
        let member_count = self.store.member_count(org_id).await?;
        Ok((org, member_count))
    }

    /// All organizations the user belongs to, newest membership first.
    pub async fn list_for_user(&self, user: &User) -> AppResult<Vec<UserOrgRecord>> {
        Ok(self.store.orgs_for_user(user.id).await?)
    }

    /// The caller's own membership view; absence is NotFound, not Forbidden.
    pub async fn my_membership(&self, org_id: OrgId, user: &User) -> AppResult<UserOrgRecord> {
        self.store
            .orgs_for_user(user.id)
            .await?
            .into_iter()
            .find(|r| r.organization.id == org_id)
            .ok_or_else(|| {
                AppError::not_found(
                    "Membership not found",
                    "You are not a member of this organization",
                )
            })
    }

    /// Leave the organization. A sole Owner cannot leave; any held license
    /// is unassigned as part of the removal.
    pub async fn leave(&self, org_id: OrgId, user: &User) -> AppResult<()> {
        if self.store.find_membership(org_id, user.id).await?.is_none() {
            return Err(AppError::not_found(
                "Membership not found",
                "You are not a member of this organization",
            ));
        }
        self.store
            .remove_membership(org_id, user.id)
            .await
            .map_err(|err| match err {
                StoreError::LastOwner => AppError::bad_request(
                    "Cannot leave",
                    "You are the only owner. Transfer ownership before leaving.",
                ),
                other => other.into(),
            })?;
        info!(org_id = %org_id, user_id = %user.id, "member left organization");
        Ok(())
    }

    pub async fn list_members(
        &self,
        org_id: OrgId,
        caller: &User,
        request: PageRequest,
    ) -> AppResult<Page<MemberRecord>> {
        self.require_org(org_id).await?;
        self.require_admin(org_id, caller).await?;
        Ok(self
            .store
            .list_members(org_id, &request.clamped())
            .await?)
    }

    pub async fn get_member(
        &self,
        org_id: OrgId,
        target_user: UserId,
        caller: &User,
    ) -> AppResult<MemberRecord> {
        self.require_org(org_id).await?;
        self.require_admin(org_id, caller).await?;
        self.store
            .find_member(org_id, target_user)
            .await?
            .ok_or_else(Self::member_not_found)
    }

    /// Change a member's role, preserving the ≥1-Owner invariant. Promoting
    /// to Owner requires the caller to already be an Owner.
    pub async fn update_member_role(
        &self,
        org_id: OrgId,
        target_user: UserId,
        new_role: OrgRole,
        caller: &User,
    ) -> AppResult<()> {
        self.require_org(org_id).await?;
        let caller_role = self.require_admin(org_id, caller).await?;
        require_grantable_role(caller_role, new_role).map_err(|_| {
            AppError::forbidden("Cannot grant owner", "Only owners can promote members to owner")
        })?;

        self.store
            .update_member_role(org_id, target_user, new_role)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => Self::member_not_found(),
                StoreError::LastOwner => AppError::bad_request(
                    "Cannot demote owner",
                    "Organization must have at least one owner",
                ),
                other => other.into(),
            })?;
        info!(org_id = %org_id, target = %target_user, role = %new_role, "updated member role");
        Ok(())
    }

    /// Remove a member, preserving the ≥1-Owner invariant and unassigning
    /// any held license.
    pub async fn remove_member(
        &self,
        org_id: OrgId,
        target_user: UserId,
        caller: &User,
    ) -> AppResult<()> {
        self.require_org(org_id).await?;
        self.require_admin(org_id, caller).await?;
        self.store
            .remove_membership(org_id, target_user)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => Self::member_not_found(),
                StoreError::LastOwner => AppError::bad_request(
                    "Cannot remove owner",
                    "Organization must have at least one owner. Transfer ownership first.",
                ),
                other => other.into(),
            })?;
        info!(org_id = %org_id, target = %target_user, "removed member");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use orglicense_auth::{IdentityClaims, PlatformRole};

    use crate::store::InMemoryStore;
    use crate::IdentityService;

    async fn fixture() -> (OrganizationService, IdentityService) {
        let store = Arc::new(InMemoryStore::new());
        (
            OrganizationService::new(store.clone()),
            IdentityService::new(store),
        )
    }

    async fn user(identity: &IdentityService, email: &str) -> User {
        identity
            .get_or_create(&IdentityClaims {
                external_id: format!("ext|{email}"),
                email: email.to_string(),
                platform_role: PlatformRole::User,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn creator_becomes_sole_owner() {
        let (orgs, identity) = fixture().await;
        let u1 = user(&identity, "u1@x.com").await;
        let org = orgs.create("Acme", None, &u1).await.unwrap();

        let (_, member_count) = orgs.get_for_member(org.id, &u1).await.unwrap();
        assert_eq!(member_count, 1);

        let record = orgs.get_member(org.id, u1.id, &u1).await.unwrap();
        assert_eq!(record.membership.role, OrgRole::Owner);
    }

    #[tokio::test]
    async fn non_member_reads_are_forbidden_and_unknown_orgs_not_found() {
        let (orgs, identity) = fixture().await;
        let u1 = user(&identity, "u1@x.com").await;
        let outsider = user(&identity, "u2@x.com").await;
        let org = orgs.create("Acme", None, &u1).await.unwrap();

        let err = orgs.get_for_member(org.id, &outsider).await.unwrap_err();
        assert_eq!(err.status(), 403);

        let err = orgs.get_for_member(OrgId::new(), &u1).await.unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn sole_owner_cannot_leave_or_be_demoted() {
        let (orgs, identity) = fixture().await;
        let u1 = user(&identity, "u1@x.com").await;
        let org = orgs.create("Acme", None, &u1).await.unwrap();

        let err = orgs.leave(org.id, &u1).await.unwrap_err();
        assert_eq!(err.status(), 400);

        let err = orgs
            .update_member_role(org.id, u1.id, OrgRole::Member, &u1)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);

        let err = orgs.remove_member(org.id, u1.id, &u1).await.unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn demotion_is_allowed_once_another_owner_exists() {
        let (orgs, identity) = fixture().await;
        let u1 = user(&identity, "u1@x.com").await;
        let u2 = user(&identity, "u2@x.com").await;
        let org = orgs.create("Acme", None, &u1).await.unwrap();

        // Seed the second member directly, then promote to Owner.
        orgs.store.accept_invitation_seed(org.id, &u2).await;
        orgs.update_member_role(org.id, u2.id, OrgRole::Owner, &u1)
            .await
            .unwrap();

        orgs.update_member_role(org.id, u1.id, OrgRole::Member, &u2)
            .await
            .unwrap();
        let record = orgs.get_member(org.id, u1.id, &u2).await.unwrap();
        assert_eq!(record.membership.role, OrgRole::Member);
    }

    #[tokio::test]
    async fn admins_cannot_promote_to_owner() {
        let (orgs, identity) = fixture().await;
        let u1 = user(&identity, "u1@x.com").await;
        let u2 = user(&identity, "u2@x.com").await;
        let u3 = user(&identity, "u3@x.com").await;
        let org = orgs.create("Acme", None, &u1).await.unwrap();
        orgs.store.accept_invitation_seed(org.id, &u2).await;
        orgs.store.accept_invitation_seed(org.id, &u3).await;
        orgs.update_member_role(org.id, u2.id, OrgRole::Admin, &u1)
            .await
            .unwrap();

        let err = orgs
            .update_member_role(org.id, u3.id, OrgRole::Owner, &u2)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 403);
    }

    #[tokio::test]
    async fn members_cannot_mutate_the_org() {
        let (orgs, identity) = fixture().await;
        let u1 = user(&identity, "u1@x.com").await;
        let u2 = user(&identity, "u2@x.com").await;
        let org = orgs.create("Acme", None, &u1).await.unwrap();
        orgs.store.accept_invitation_seed(org.id, &u2).await;

        let err = orgs.update(org.id, "Evil", None, &u2).await.unwrap_err();
        assert_eq!(err.status(), 403);
        let err = orgs.delete(org.id, &u2).await.unwrap_err();
        assert_eq!(err.status(), 403);
    }

    #[tokio::test]
    async fn delete_cascades_memberships() {
        let (orgs, identity) = fixture().await;
        let u1 = user(&identity, "u1@x.com").await;
        let org = orgs.create("Acme", None, &u1).await.unwrap();

        orgs.delete(org.id, &u1).await.unwrap();
        assert!(orgs.list_for_user(&u1).await.unwrap().is_empty());
    }
}

#[cfg(test)]
impl dyn Store {
    /// Test helper: add a plain Member without going through an invitation.
    pub(crate) async fn accept_invitation_seed(&self, org_id: OrgId, user: &User) {
        let membership = Membership::new(org_id, user.id, OrgRole::Member, Utc::now());
        let invitation = orglicense_directory::Invitation::issue(
            org_id,
            &user.email,
            OrgRole::Member,
            user.id,
            Utc::now(),
        )
        .unwrap();
        self.insert_invitation(&invitation).await.unwrap();
        self.accept_invitation(invitation.id, &membership)
            .await
            .unwrap();
    }
}
