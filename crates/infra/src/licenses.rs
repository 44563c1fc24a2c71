//! License lifecycle operations.
//!
//! Admin-surface operations (create/update/cancel/list-all) are gated by the
//! platform role at the HTTP boundary; org-scoped assignment operations gate
//! on the caller's membership role here.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use orglicense_auth::{require_min_role, OrgRole};
use orglicense_core::{AppError, AppResult, LicenseId, OrgId, Page, PageRequest, UserId};
use orglicense_directory::User;
use orglicense_licensing::License;

use crate::settings::ExpirationSettings;
use crate::store::{LicenseRecord, Store, StoreError};

#[derive(Clone)]
pub struct LicenseService {
    store: Arc<dyn Store>,
    settings: ExpirationSettings,
}

impl LicenseService {
    pub fn new(store: Arc<dyn Store>, settings: ExpirationSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &ExpirationSettings {
        &self.settings
    }

    fn license_not_found(license_id: LicenseId) -> AppError {
        AppError::not_found(
            "License not found",
            format!("License with ID {license_id} does not exist"),
        )
    }

    async fn require_license(&self, license_id: LicenseId) -> AppResult<License> {
        self.store
            .find_license(license_id)
            .await?
            .ok_or_else(|| Self::license_not_found(license_id))
    }

    async fn record_for(&self, license: License) -> AppResult<LicenseRecord> {
        let assignee_email = match license.assigned_to {
            Some(user_id) => self.store.find_user(user_id).await?.map(|u| u.email),
            None => None,
        };
        Ok(LicenseRecord {
            license,
            assignee_email,
        })
    }

    /// Issue a license for the organization, expiring one current window
    /// from now.
    pub async fn create(&self, org_id: OrgId, auto_renewal: bool) -> AppResult<License> {
        if self.store.find_org(org_id).await?.is_none() {
            return Err(AppError::not_found(
                "Organization not found",
                format!("Organization with ID {org_id} does not exist"),
            ));
        }

        let license = License::issue(org_id, auto_renewal, self.settings.minutes(), Utc::now());
        self.store.insert_license(&license).await?;
        info!(license_id = %license.id, org_id = %org_id, "created license");
        Ok(license)
    }

    /// Update expiry and/or auto-renewal; each field is independent.
    pub async fn update(
        &self,
        license_id: LicenseId,
        expires_at: Option<chrono::DateTime<Utc>>,
        auto_renewal: Option<bool>,
    ) -> AppResult<LicenseRecord> {
        let mut license = self.require_license(license_id).await?;
        license.apply_update(expires_at, auto_renewal, Utc::now())?;
        self.store.update_license(&license).await?;
        info!(license_id = %license_id, "updated license");
        self.record_for(license).await
    }

    /// Cancel: terminal, always disables auto-renewal.
    pub async fn cancel(&self, license_id: LicenseId) -> AppResult<()> {
        let mut license = self.require_license(license_id).await?;
        license.cancel(Utc::now());
        self.store.update_license(&license).await?;
        info!(license_id = %license_id, "cancelled license");
        Ok(())
    }

    pub async fn get(&self, license_id: LicenseId) -> AppResult<LicenseRecord> {
        let license = self.require_license(license_id).await?;
        self.record_for(license).await
    }

    /// Assign a license to a member of the organization.
    ///
    /// The caller must be Owner/Admin of the org; the license must belong to
    /// the org and be active. Re-assigning a member their own license is a
    /// no-op; a license held by a different user or a member already holding
    /// a different license is rejected, re-checked inside the store's
    /// assignment transaction.
    pub async fn assign(
        &self,
        org_id: OrgId,
        target_user: UserId,
        license_id: LicenseId,
        caller: &User,
    ) -> AppResult<()> {
        self.require_org_admin(org_id, caller).await?;

        if self
            .store
            .find_membership(org_id, target_user)
            .await?
            .is_none()
        {
            return Err(AppError::not_found(
                "Member not found",
                "The specified user is not a member of this organization",
            ));
        }

        let license = self
            .store
            .find_license(license_id)
            .await?
            .filter(|l| l.org_id == org_id)
            .ok_or_else(|| {
                AppError::not_found(
                    "License not found",
                    "The specified license does not belong to this organization",
                )
            })?;
        if !license.is_active {
            return Err(AppError::bad_request(
                "License inactive",
                "Cannot assign an inactive license",
            ));
        }

        self.store
            .assign_license(org_id, target_user, license_id, Utc::now())
            .await
            .map_err(|err| match err {
                StoreError::NotFound => AppError::not_found(
                    "License not found",
                    "The specified license does not belong to this organization",
                ),
                other => other.into(),
            })?;
        info!(license_id = %license_id, org_id = %org_id, user_id = %target_user, "assigned license");
        Ok(())
    }

    /// Clear a member's license link; safe no-op when nothing is assigned.
    pub async fn unassign(
        &self,
        org_id: OrgId,
        target_user: UserId,
        caller: &User,
    ) -> AppResult<()> {
        self.require_org_admin(org_id, caller).await?;
        self.store
            .unassign_member_license(org_id, target_user, Utc::now())
            .await
            .map_err(|err| match err {
                StoreError::NotFound => AppError::not_found(
                    "Member not found",
                    "The specified user is not a member of this organization",
                ),
                other => other.into(),
            })?;
        info!(org_id = %org_id, user_id = %target_user, "unassigned license");
        Ok(())
    }

    /// Org-scoped listing; caller must be Owner/Admin of the org.
    pub async fn list_for_org(
        &self,
        org_id: OrgId,
        caller: &User,
        request: PageRequest,
    ) -> AppResult<Page<LicenseRecord>> {
        self.require_org_admin(org_id, caller).await?;
        Ok(self
            .store
            .list_licenses_for_org(org_id, &request.clamped())
            .await?)
    }

    /// Cross-organization listing for the platform admin surface.
    pub async fn list_all(&self, request: PageRequest) -> AppResult<Page<LicenseRecord>> {
        Ok(self.store.list_all_licenses(&request.clamped()).await?)
    }

    /// One renewal sweep: extend every active, auto-renewing, expired
    /// license by the current window in a single atomic batch.
    ///
    /// Idempotent: a second immediate run finds nothing, because every
    /// renewal pushes `expires_at` into the future.
    pub async fn renew_expired(&self) -> AppResult<usize> {
        let renewed = self
            .store
            .renew_expired_licenses(self.settings.minutes(), Utc::now())
            .await?;
        for license in &renewed {
            info!(license_id = %license.id, org_id = %license.org_id, "renewed license");
        }
        if !renewed.is_empty() {
            info!(count = renewed.len(), "renewed expired licenses");
        }
        Ok(renewed.len())
    }

    async fn require_org_admin(&self, org_id: OrgId, caller: &User) -> AppResult<()> {
        if self.store.find_org(org_id).await?.is_none() {
            return Err(AppError::not_found(
                "Organization not found",
                format!("Organization with ID {org_id} does not exist"),
            ));
        }
        let role = self
            .store
            .find_membership(org_id, caller.id)
            .await?
            .map(|m| m.role);
        require_min_role(role, OrgRole::Admin)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use orglicense_auth::{IdentityClaims, PlatformRole};
    use orglicense_directory::Organization;

    use crate::store::{InMemoryStore, LicenseStore};
    use crate::{IdentityService, OrganizationService};

    struct Fixture {
        licenses: LicenseService,
        orgs: OrganizationService,
        identity: IdentityService,
        store: Arc<InMemoryStore>,
    }

    fn fixture() -> Fixture {
        let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
        let settings = ExpirationSettings::new(store.clone());
        Fixture {
            licenses: LicenseService::new(store.clone(), settings),
            orgs: OrganizationService::new(store.clone()),
            identity: IdentityService::new(store.clone()),
            store,
        }
    }

    impl Fixture {
        async fn user(&self, email: &str) -> User {
            self.identity
                .get_or_create(&IdentityClaims {
                    external_id: format!("ext|{email}"),
                    email: email.to_string(),
                    platform_role: PlatformRole::User,
                })
                .await
                .unwrap()
        }

        async fn org(&self, owner: &User) -> Organization {
            self.orgs.create("Acme", None, owner).await.unwrap()
        }

        async fn add_member(&self, org_id: OrgId, user: &User) {
            let store: Arc<dyn Store> = self.store.clone();
            store.accept_invitation_seed(org_id, user).await;
        }

        /// Rewind a license's expiry so the sweep sees it as expired.
        async fn force_expire(&self, license_id: LicenseId) {
            let mut license = self.store.find_license(license_id).await.unwrap().unwrap();
            license.expires_at = Utc::now() - Duration::minutes(1);
            self.store.update_license(&license).await.unwrap();
        }
    }

    #[tokio::test]
    async fn create_uses_the_current_expiration_window() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let org = f.org(&owner).await;

        f.licenses.settings().set_minutes(30).unwrap();
        let before = Utc::now();
        let license = f.licenses.create(org.id, true).await.unwrap();

        assert!(license.is_active);
        assert!(license.auto_renewal);
        assert!(license.expires_at >= before + Duration::minutes(30));
        assert_eq!(license.assigned_to, None);
    }

    #[tokio::test]
    async fn create_requires_an_existing_org() {
        let f = fixture();
        let err = f.licenses.create(OrgId::new(), false).await.unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn update_rejects_past_expiry_and_updates_fields_independently() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let org = f.org(&owner).await;
        let license = f.licenses.create(org.id, false).await.unwrap();

        let err = f
            .licenses
            .update(license.id, Some(Utc::now() - Duration::minutes(5)), None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);

        let record = f
            .licenses
            .update(license.id, None, Some(true))
            .await
            .unwrap();
        assert!(record.license.auto_renewal);
        assert_eq!(record.license.expires_at, license.expires_at);
    }

    #[tokio::test]
    async fn assignment_is_idempotent_for_the_same_member() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let member = f.user("m@x.com").await;
        let org = f.org(&owner).await;
        f.add_member(org.id, &member).await;
        let license = f.licenses.create(org.id, false).await.unwrap();

        f.licenses
            .assign(org.id, member.id, license.id, &owner)
            .await
            .unwrap();
        f.licenses
            .assign(org.id, member.id, license.id, &owner)
            .await
            .unwrap();

        let record = f.orgs.get_member(org.id, member.id, &owner).await.unwrap();
        assert_eq!(record.license.as_ref().map(|l| l.id), Some(license.id));
        let stored = f.store.find_license(license.id).await.unwrap().unwrap();
        assert_eq!(stored.assigned_to, Some(member.id));
    }

    #[tokio::test]
    async fn a_license_cannot_be_assigned_to_two_members() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let m1 = f.user("m1@x.com").await;
        let m2 = f.user("m2@x.com").await;
        let org = f.org(&owner).await;
        f.add_member(org.id, &m1).await;
        f.add_member(org.id, &m2).await;
        let license = f.licenses.create(org.id, false).await.unwrap();

        f.licenses.assign(org.id, m1.id, license.id, &owner).await.unwrap();
        let err = f
            .licenses
            .assign(org.id, m2.id, license.id, &owner)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn a_member_holds_at_most_one_license() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let member = f.user("m@x.com").await;
        let org = f.org(&owner).await;
        f.add_member(org.id, &member).await;
        let first = f.licenses.create(org.id, false).await.unwrap();
        let second = f.licenses.create(org.id, false).await.unwrap();

        f.licenses.assign(org.id, member.id, first.id, &owner).await.unwrap();
        let err = f
            .licenses
            .assign(org.id, member.id, second.id, &owner)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn cancelled_licenses_cannot_be_assigned() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let member = f.user("m@x.com").await;
        let org = f.org(&owner).await;
        f.add_member(org.id, &member).await;
        let license = f.licenses.create(org.id, true).await.unwrap();

        f.licenses.cancel(license.id).await.unwrap();
        let stored = f.store.find_license(license.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(!stored.auto_renewal, "cancel always disables renewal");

        let err = f
            .licenses
            .assign(org.id, member.id, license.id, &owner)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn unassign_is_a_safe_no_op() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let member = f.user("m@x.com").await;
        let org = f.org(&owner).await;
        f.add_member(org.id, &member).await;

        f.licenses.unassign(org.id, member.id, &owner).await.unwrap();
    }

    #[tokio::test]
    async fn removing_a_member_unassigns_their_license() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let member = f.user("m@x.com").await;
        let org = f.org(&owner).await;
        f.add_member(org.id, &member).await;
        let license = f.licenses.create(org.id, false).await.unwrap();
        f.licenses.assign(org.id, member.id, license.id, &owner).await.unwrap();

        f.orgs.remove_member(org.id, member.id, &owner).await.unwrap();

        let stored = f.store.find_license(license.id).await.unwrap().unwrap();
        assert_eq!(stored.assigned_to, None);
    }

    #[tokio::test]
    async fn member_role_cannot_assign() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let member = f.user("m@x.com").await;
        let org = f.org(&owner).await;
        f.add_member(org.id, &member).await;
        let license = f.licenses.create(org.id, false).await.unwrap();

        let err = f
            .licenses
            .assign(org.id, member.id, license.id, &member)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 403);
    }

    #[tokio::test]
    async fn sweep_renews_each_eligible_license_exactly_once() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let org = f.org(&owner).await;

        let renewing = f.licenses.create(org.id, true).await.unwrap();
        let manual = f.licenses.create(org.id, false).await.unwrap();
        let cancelled = f.licenses.create(org.id, true).await.unwrap();
        f.licenses.cancel(cancelled.id).await.unwrap();

        for id in [renewing.id, manual.id, cancelled.id] {
            f.force_expire(id).await;
        }

        let before = Utc::now();
        assert_eq!(f.licenses.renew_expired().await.unwrap(), 1);

        let renewed = f.store.find_license(renewing.id).await.unwrap().unwrap();
        assert!(renewed.is_active);
        assert!(renewed.expires_at >= before + Duration::minutes(10));

        let untouched = f.store.find_license(manual.id).await.unwrap().unwrap();
        assert!(untouched.is_expired(Utc::now()));
        let dead = f.store.find_license(cancelled.id).await.unwrap().unwrap();
        assert!(!dead.is_active);

        // Immediately re-running finds zero candidates.
        assert_eq!(f.licenses.renew_expired().await.unwrap(), 0);
    }
}
