//! Invitation issuance, acceptance, and cancellation.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use orglicense_auth::{require_grantable_role, require_min_role, OrgRole};
use orglicense_core::{AppError, AppResult, InvitationId, OrgId, Page, PageRequest};
use orglicense_directory::{Invitation, Membership, Organization, User};

use crate::notifier::InvitationNotifier;
use crate::store::{Store, StoreError};

#[derive(Clone)]
pub struct InvitationService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn InvitationNotifier>,
}

impl InvitationService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn InvitationNotifier>) -> Self {
        Self { store, notifier }
    }

    fn org_not_found(org_id: OrgId) -> AppError {
        AppError::not_found(
            "Organization not found",
            format!("Organization with ID {org_id} does not exist"),
        )
    }

    fn invitation_not_found(id: InvitationId) -> AppError {
        AppError::not_found(
            "Invitation not found",
            format!("Invitation with ID {id} does not exist"),
        )
    }

    async fn require_org(&self, org_id: OrgId) -> AppResult<Organization> {
        self.store
            .find_org(org_id)
            .await?
            .ok_or_else(|| Self::org_not_found(org_id))
    }

    async fn require_admin(&self, org_id: OrgId, caller: &User) -> AppResult<OrgRole> {
        let role = self
            .store
            .find_membership(org_id, caller.id)
            .await?
            .map(|m| m.role);
        Ok(require_min_role(role, OrgRole::Admin)?)
    }

    /// Issue an invitation and hand it to the notifier.
    ///
    /// Notification is fire-and-forget: the invitation exists whether or not
    /// the email ever goes out; delivery failures are only logged.
    pub async fn create(
        &self,
        org_id: OrgId,
        email: &str,
        role: OrgRole,
        inviter: &User,
    ) -> AppResult<(Invitation, Organization)> {
        let org = self.require_org(org_id).await?;
        let inviter_role = self.require_admin(org_id, inviter).await?;
        require_grantable_role(inviter_role, role).map_err(|_| {
            AppError::forbidden("Cannot invite as owner", "Only owners can invite new owners")
        })?;

        let invitation = Invitation::issue(org_id, email, role, inviter.id, Utc::now())?;

        if self
            .store
            .member_email_exists(org_id, &invitation.email)
            .await?
        {
            return Err(AppError::bad_request(
                "Already a member",
                "This user is already a member of the organization",
            ));
        }
        if self
            .store
            .pending_exists_for_email(org_id, &invitation.email)
            .await?
        {
            return Err(AppError::bad_request(
                "Invitation exists",
                "An invitation has already been sent to this email",
            ));
        }

        self.store.insert_invitation(&invitation).await?;
        info!(org_id = %org_id, email = %invitation.email, role = %role, "created invitation");

        let notifier = Arc::clone(&self.notifier);
        let (email, org_name, token) = (
            invitation.email.clone(),
            org.name.clone(),
            invitation.token.clone(),
        );
        tokio::spawn(async move {
            if let Err(err) = notifier.notify_invitation(&email, &org_name, &token).await {
                warn!(error = %err, email = %email, "invitation notification failed");
            }
        });

        Ok((invitation, org))
    }

    pub async fn list(
        &self,
        org_id: OrgId,
        caller: &User,
        request: PageRequest,
    ) -> AppResult<(Page<Invitation>, Organization)> {
        let org = self.require_org(org_id).await?;
        self.require_admin(org_id, caller).await?;
        let page = self
            .store
            .list_invitations(org_id, &request.clamped())
            .await?;
        Ok((page, org))
    }

    pub async fn get(
        &self,
        org_id: OrgId,
        invitation_id: InvitationId,
        caller: &User,
    ) -> AppResult<(Invitation, Organization)> {
        let org = self.require_org(org_id).await?;
        self.require_admin(org_id, caller).await?;
        let invitation = self
            .store
            .find_invitation(org_id, invitation_id)
            .await?
            .ok_or_else(|| Self::invitation_not_found(invitation_id))?;
        Ok((invitation, org))
    }

    pub async fn cancel(
        &self,
        org_id: OrgId,
        invitation_id: InvitationId,
        caller: &User,
    ) -> AppResult<()> {
        self.require_org(org_id).await?;
        self.require_admin(org_id, caller).await?;
        let invitation = self
            .store
            .find_invitation(org_id, invitation_id)
            .await?
            .ok_or_else(|| Self::invitation_not_found(invitation_id))?;
        self.store.delete_invitation(invitation.id).await?;
        info!(org_id = %org_id, invitation_id = %invitation_id, "cancelled invitation");
        Ok(())
    }

    /// Redeem a token for a membership.
    ///
    /// Expired tokens and already-member redemptions consume the invitation;
    /// an email mismatch does not, so the intended recipient can still use
    /// it. Membership creation and invitation deletion are atomic.
    pub async fn accept(&self, token: &str, user: &User) -> AppResult<(Membership, Organization)> {
        let now = Utc::now();
        let invitation = self
            .store
            .find_invitation_by_token(token)
            .await?
            .ok_or_else(|| {
                AppError::not_found("Invitation not found", "Invalid or expired invitation token")
            })?;

        if invitation.is_expired(now) {
            self.store.delete_invitation(invitation.id).await?;
            return Err(AppError::bad_request(
                "Invitation expired",
                "This invitation has expired",
            ));
        }

        if !invitation.is_addressed_to(&user.email) {
            return Err(AppError::forbidden(
                "Email mismatch",
                "This invitation was sent to a different email address",
            ));
        }

        if self
            .store
            .find_membership(invitation.org_id, user.id)
            .await?
            .is_some()
        {
            self.store.delete_invitation(invitation.id).await?;
            return Err(AppError::bad_request(
                "Already a member",
                "You are already a member of this organization",
            ));
        }

        let membership = Membership::new(invitation.org_id, user.id, invitation.role, now);
        self.store
            .accept_invitation(invitation.id, &membership)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => AppError::not_found(
                    "Invitation not found",
                    "Invalid or expired invitation token",
                ),
                other => other.into(),
            })?;

        let organization = self
            .store
            .find_org(invitation.org_id)
            .await?
            .ok_or_else(|| Self::org_not_found(invitation.org_id))?;

        info!(org_id = %organization.id, user_id = %user.id, "invitation accepted");
        Ok((membership, organization))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use orglicense_auth::{IdentityClaims, PlatformRole};

    use crate::notifier::LogNotifier;
    use crate::store::InMemoryStore;
    use crate::{IdentityService, OrganizationService};

    struct Fixture {
        invitations: InvitationService,
        orgs: OrganizationService,
        identity: IdentityService,
    }

    fn fixture() -> Fixture {
        let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
        Fixture {
            invitations: InvitationService::new(store.clone(), Arc::new(LogNotifier)),
            orgs: OrganizationService::new(store.clone()),
            identity: IdentityService::new(store),
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
    }

    #[tokio::test]
    async fn invite_then_accept_creates_the_membership_and_consumes_the_token() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let invitee = f.user("b@x.com").await;
        let org = f.orgs.create("Acme", None, &owner).await.unwrap();

        let (invitation, _) = f
            .invitations
            .create(org.id, "B@X.com", OrgRole::Member, &owner)
            .await
            .unwrap();
        assert_eq!(invitation.email, "b@x.com");

        let (membership, accepted_org) =
            f.invitations.accept(&invitation.token, &invitee).await.unwrap();
        assert_eq!(membership.role, OrgRole::Member);
        assert_eq!(accepted_org.id, org.id);

        let (_, member_count) = f.orgs.get_for_member(org.id, &invitee).await.unwrap();
        assert_eq!(member_count, 2);

        // Second redemption of the same token is NotFound.
        let err = f
            .invitations
            .accept(&invitation.token, &invitee)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn members_cannot_invite() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let member = f.user("m@x.com").await;
        let org = f.orgs.create("Acme", None, &owner).await.unwrap();

        let (invitation, _) = f
            .invitations
            .create(org.id, "m@x.com", OrgRole::Member, &owner)
            .await
            .unwrap();
        f.invitations.accept(&invitation.token, &member).await.unwrap();

        let err = f
            .invitations
            .create(org.id, "other@x.com", OrgRole::Member, &member)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 403);
    }

    #[tokio::test]
    async fn only_owners_invite_owners() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let admin = f.user("a@x.com").await;
        let org = f.orgs.create("Acme", None, &owner).await.unwrap();

        let (invitation, _) = f
            .invitations
            .create(org.id, "a@x.com", OrgRole::Admin, &owner)
            .await
            .unwrap();
        f.invitations.accept(&invitation.token, &admin).await.unwrap();

        let err = f
            .invitations
            .create(org.id, "boss@x.com", OrgRole::Owner, &admin)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 403);

        f.invitations
            .create(org.id, "boss@x.com", OrgRole::Owner, &owner)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_targets_are_rejected() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let org = f.orgs.create("Acme", None, &owner).await.unwrap();

        // Existing member.
        let err = f
            .invitations
            .create(org.id, "u1@x.com", OrgRole::Member, &owner)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);

        // Pending invitation, matched case-insensitively.
        f.invitations
            .create(org.id, "b@x.com", OrgRole::Member, &owner)
            .await
            .unwrap();
        let err = f
            .invitations
            .create(org.id, "B@X.COM", OrgRole::Member, &owner)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn expired_invitations_are_deleted_on_redemption() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let invitee = f.user("b@x.com").await;
        let org = f.orgs.create("Acme", None, &owner).await.unwrap();

        let (mut invitation, _) = f
            .invitations
            .create(org.id, "b@x.com", OrgRole::Member, &owner)
            .await
            .unwrap();

        // Force expiry in the store.
        invitation.expires_at = Utc::now() - chrono::Duration::minutes(1);
        f.invitations
            .store
            .delete_invitation(invitation.id)
            .await
            .unwrap();
        f.invitations
            .store
            .insert_invitation(&invitation)
            .await
            .unwrap();

        let err = f
            .invitations
            .accept(&invitation.token, &invitee)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);

        // The row is gone: a retry is NotFound, and a fresh invite works.
        let err = f
            .invitations
            .accept(&invitation.token, &invitee)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);
        f.invitations
            .create(org.id, "b@x.com", OrgRole::Member, &owner)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn email_mismatch_is_forbidden_and_preserves_the_invitation() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let interceptor = f.user("mallory@x.com").await;
        let invitee = f.user("b@x.com").await;
        let org = f.orgs.create("Acme", None, &owner).await.unwrap();

        let (invitation, _) = f
            .invitations
            .create(org.id, "b@x.com", OrgRole::Member, &owner)
            .await
            .unwrap();

        let err = f
            .invitations
            .accept(&invitation.token, &interceptor)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 403);

        // The intended recipient can still redeem it.
        f.invitations.accept(&invitation.token, &invitee).await.unwrap();
    }

    #[tokio::test]
    async fn accepting_while_already_a_member_consumes_the_invitation() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let invitee = f.user("b@x.com").await;
        let org = f.orgs.create("Acme", None, &owner).await.unwrap();

        let (first, _) = f
            .invitations
            .create(org.id, "b@x.com", OrgRole::Member, &owner)
            .await
            .unwrap();
        f.invitations.accept(&first.token, &invitee).await.unwrap();

        // A second invitation to a now-member can be created only if the
        // member-check is bypassed; simulate the race by inserting directly.
        let stale = Invitation::issue(org.id, "b@x.com", OrgRole::Member, owner.id, Utc::now())
            .unwrap();
        f.invitations.store.insert_invitation(&stale).await.unwrap();

        let err = f.invitations.accept(&stale.token, &invitee).await.unwrap_err();
        assert_eq!(err.status(), 400);

        let err = f.invitations.accept(&stale.token, &invitee).await.unwrap_err();
        assert_eq!(err.status(), 404, "the moot invitation must be gone");
    }

    #[tokio::test]
    async fn cancel_deletes_the_row() {
        let f = fixture();
        let owner = f.user("u1@x.com").await;
        let org = f.orgs.create("Acme", None, &owner).await.unwrap();

        let (invitation, _) = f
            .invitations
            .create(org.id, "b@x.com", OrgRole::Member, &owner)
            .await
            .unwrap();
        f.invitations
            .cancel(org.id, invitation.id, &owner)
            .await
            .unwrap();

        let err = f
            .invitations
            .get(org.id, invitation.id, &owner)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }
}
