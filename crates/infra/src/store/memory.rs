//! In-memory store.
//!
//! Backs tests and local development. One lock around the whole state makes
//! every trait method trivially atomic; none of the methods hold the lock
//! across an await point.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use orglicense_auth::OrgRole;
use orglicense_core::{InvitationId, LicenseId, MembershipId, OrgId, Page, PageRequest, UserId};
use orglicense_directory::{normalize_email, Invitation, Membership, Organization, User};
use orglicense_licensing::License;

use super::{
    InvitationStore, LicenseRecord, LicenseStore, MemberRecord, MembershipStore, OrgStore,
    SettingStore, StoreError, StoreResult, UserOrgRecord, UserStore,
};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    orgs: HashMap<OrgId, Organization>,
    memberships: HashMap<MembershipId, Membership>,
    invitations: HashMap<InvitationId, Invitation>,
    licenses: HashMap<LicenseId, License>,
    settings: HashMap<String, String>,
}

impl State {
    fn membership_of(&self, org_id: OrgId, user_id: UserId) -> Option<&Membership> {
        self.memberships
            .values()
            .find(|m| m.org_id == org_id && m.user_id == user_id)
    }

    fn owner_count(&self, org_id: OrgId) -> usize {
        self.memberships
            .values()
            .filter(|m| m.org_id == org_id && m.role == OrgRole::Owner)
            .count()
    }

    /// Clear both sides of a member's license link, if any.
    fn unassign(&mut self, membership_id: MembershipId, now: DateTime<Utc>) {
        let Some(membership) = self.memberships.get_mut(&membership_id) else {
            return;
        };
        if let Some(license_id) = membership.assigned_license_id.take() {
            if let Some(license) = self.licenses.get_mut(&license_id) {
                license.assigned_to = None;
                license.updated_at = now;
            }
        }
    }
}

/// Whole-state-behind-one-lock store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T>(mut items: Vec<T>, request: &PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let start = (request.offset() as usize).min(items.len());
    let mut tail = items.split_off(start);
    tail.truncate(request.page_size as usize);
    Page::new(tail, request, total)
}

fn apply_direction<T>(items: &mut [T], descending: bool) {
    if descending {
        items.reverse();
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_user_by_external_id(&self, external_id: &str) -> StoreResult<Option<User>> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .users
            .values()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.inner.lock().unwrap().users.get(&id).cloned())
    }

    async fn upsert_user(&self, user: &User) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .users
            .insert(user.id, user.clone());
        Ok(())
    }
}

#[async_trait]
impl OrgStore for InMemoryStore {
    async fn insert_org_with_owner(
        &self,
        org: &Organization,
        owner: &Membership,
    ) -> StoreResult<()> {
        let mut state = self.inner.lock().unwrap();
        state.orgs.insert(org.id, org.clone());
        state.memberships.insert(owner.id, owner.clone());
        Ok(())
    }

    async fn find_org(&self, id: OrgId) -> StoreResult<Option<Organization>> {
        Ok(self.inner.lock().unwrap().orgs.get(&id).cloned())
    }

    async fn update_org(&self, org: &Organization) -> StoreResult<()> {
        let mut state = self.inner.lock().unwrap();
        if !state.orgs.contains_key(&org.id) {
            return Err(StoreError::NotFound);
        }
        state.orgs.insert(org.id, org.clone());
        Ok(())
    }

    async fn delete_org(&self, id: OrgId) -> StoreResult<()> {
        let mut state = self.inner.lock().unwrap();
        if state.orgs.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        state.memberships.retain(|_, m| m.org_id != id);
        state.invitations.retain(|_, i| i.org_id != id);
        state.licenses.retain(|_, l| l.org_id != id);
        Ok(())
    }

    async fn member_count(&self, org_id: OrgId) -> StoreResult<u64> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .memberships
            .values()
            .filter(|m| m.org_id == org_id)
            .count() as u64)
    }
}

#[async_trait]
impl MembershipStore for InMemoryStore {
    async fn find_membership(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> StoreResult<Option<Membership>> {
        let state = self.inner.lock().unwrap();
        Ok(state.membership_of(org_id, user_id).cloned())
    }

    async fn orgs_for_user(&self, user_id: UserId) -> StoreResult<Vec<UserOrgRecord>> {
        let state = self.inner.lock().unwrap();
        let mut records: Vec<UserOrgRecord> = state
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                let organization = state.orgs.get(&m.org_id)?.clone();
                let member_count = state
                    .memberships
                    .values()
                    .filter(|other| other.org_id == m.org_id)
                    .count() as u64;
                Some(UserOrgRecord {
                    membership: m.clone(),
                    organization,
                    member_count,
                })
            })
            .collect();
        records.sort_by(|a, b| b.membership.joined_at.cmp(&a.membership.joined_at));
        Ok(records)
    }

    async fn update_member_role(
        &self,
        org_id: OrgId,
        user_id: UserId,
        role: OrgRole,
    ) -> StoreResult<()> {
        let mut state = self.inner.lock().unwrap();
        let membership_id = state
            .membership_of(org_id, user_id)
            .map(|m| m.id)
            .ok_or(StoreError::NotFound)?;

        let current = state.memberships[&membership_id].role;
        if current == OrgRole::Owner && role != OrgRole::Owner && state.owner_count(org_id) <= 1 {
            return Err(StoreError::LastOwner);
        }

        if let Some(membership) = state.memberships.get_mut(&membership_id) {
            membership.role = role;
        }
        Ok(())
    }

    async fn remove_membership(&self, org_id: OrgId, user_id: UserId) -> StoreResult<()> {
        let mut state = self.inner.lock().unwrap();
        let membership_id = state
            .membership_of(org_id, user_id)
            .map(|m| m.id)
            .ok_or(StoreError::NotFound)?;

        if state.memberships[&membership_id].role == OrgRole::Owner
            && state.owner_count(org_id) <= 1
        {
            return Err(StoreError::LastOwner);
        }

        let now = Utc::now();
        state.unassign(membership_id, now);
        state.memberships.remove(&membership_id);
        Ok(())
    }

    async fn list_members(
        &self,
        org_id: OrgId,
        request: &PageRequest,
    ) -> StoreResult<Page<MemberRecord>> {
        let state = self.inner.lock().unwrap();
        let mut records: Vec<MemberRecord> = state
            .memberships
            .values()
            .filter(|m| m.org_id == org_id)
            .filter_map(|m| {
                let user = state.users.get(&m.user_id)?.clone();
                let license = m
                    .assigned_license_id
                    .and_then(|id| state.licenses.get(&id))
                    .cloned();
                Some(MemberRecord {
                    membership: m.clone(),
                    user,
                    license,
                })
            })
            .collect();

        if let Some(term) = request.search_term() {
            records.retain(|r| r.user.email.to_lowercase().contains(&term));
        }

        match request.sort_key().as_deref() {
            Some("email") => records.sort_by(|a, b| a.user.email.cmp(&b.user.email)),
            Some("role") => records.sort_by_key(|r| r.membership.role),
            _ => records.sort_by_key(|r| r.membership.joined_at),
        }
        apply_direction(&mut records, request.sort_descending);

        Ok(paginate(records, request))
    }

    async fn find_member(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> StoreResult<Option<MemberRecord>> {
        let state = self.inner.lock().unwrap();
        let Some(membership) = state.membership_of(org_id, user_id).cloned() else {
            return Ok(None);
        };
        let Some(user) = state.users.get(&membership.user_id).cloned() else {
            return Ok(None);
        };
        let license = membership
            .assigned_license_id
            .and_then(|id| state.licenses.get(&id))
            .cloned();
        Ok(Some(MemberRecord {
            membership,
            user,
            license,
        }))
    }
}

#[async_trait]
impl InvitationStore for InMemoryStore {
    async fn insert_invitation(&self, invitation: &Invitation) -> StoreResult<()> {
        let mut state = self.inner.lock().unwrap();
        let duplicate = state
            .invitations
            .values()
            .any(|i| i.org_id == invitation.org_id && i.email == invitation.email);
        if duplicate {
            return Err(StoreError::DuplicateInvitation);
        }
        state.invitations.insert(invitation.id, invitation.clone());
        Ok(())
    }

    async fn find_invitation(
        &self,
        org_id: OrgId,
        id: InvitationId,
    ) -> StoreResult<Option<Invitation>> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .invitations
            .get(&id)
            .filter(|i| i.org_id == org_id)
            .cloned())
    }

    async fn find_invitation_by_token(&self, token: &str) -> StoreResult<Option<Invitation>> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .invitations
            .values()
            .find(|i| i.token == token)
            .cloned())
    }

    async fn delete_invitation(&self, id: InvitationId) -> StoreResult<()> {
        self.inner.lock().unwrap().invitations.remove(&id);
        Ok(())
    }

    async fn pending_exists_for_email(&self, org_id: OrgId, email: &str) -> StoreResult<bool> {
        let email = normalize_email(email);
        let state = self.inner.lock().unwrap();
        Ok(state
            .invitations
            .values()
            .any(|i| i.org_id == org_id && i.email == email))
    }

    async fn member_email_exists(&self, org_id: OrgId, email: &str) -> StoreResult<bool> {
        let email = normalize_email(email);
        let state = self.inner.lock().unwrap();
        Ok(state
            .memberships
            .values()
            .filter(|m| m.org_id == org_id)
            .any(|m| {
                state
                    .users
                    .get(&m.user_id)
                    .is_some_and(|u| u.email.to_lowercase() == email)
            }))
    }

    async fn list_invitations(
        &self,
        org_id: OrgId,
        request: &PageRequest,
    ) -> StoreResult<Page<Invitation>> {
        let state = self.inner.lock().unwrap();
        let mut records: Vec<Invitation> = state
            .invitations
            .values()
            .filter(|i| i.org_id == org_id)
            .cloned()
            .collect();

        if let Some(term) = request.search_term() {
            records.retain(|i| i.email.contains(&term));
        }

        match request.sort_key().as_deref() {
            Some("email") => records.sort_by(|a, b| a.email.cmp(&b.email)),
            Some("role") => records.sort_by_key(|i| i.role),
            Some("expiresat") => records.sort_by_key(|i| i.expires_at),
            _ => records.sort_by_key(|i| i.created_at),
        }
        apply_direction(&mut records, request.sort_descending);

        Ok(paginate(records, request))
    }

    async fn accept_invitation(
        &self,
        invitation_id: InvitationId,
        membership: &Membership,
    ) -> StoreResult<()> {
        let mut state = self.inner.lock().unwrap();
        if !state.invitations.contains_key(&invitation_id) {
            return Err(StoreError::NotFound);
        }
        if state
            .membership_of(membership.org_id, membership.user_id)
            .is_some()
        {
            return Err(StoreError::DuplicateMembership);
        }
        state.memberships.insert(membership.id, membership.clone());
        state.invitations.remove(&invitation_id);
        Ok(())
    }
}

#[async_trait]
impl LicenseStore for InMemoryStore {
    async fn insert_license(&self, license: &License) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .licenses
            .insert(license.id, license.clone());
        Ok(())
    }

    async fn find_license(&self, id: LicenseId) -> StoreResult<Option<License>> {
        Ok(self.inner.lock().unwrap().licenses.get(&id).cloned())
    }

    async fn update_license(&self, license: &License) -> StoreResult<()> {
        let mut state = self.inner.lock().unwrap();
        if !state.licenses.contains_key(&license.id) {
            return Err(StoreError::NotFound);
        }
        state.licenses.insert(license.id, license.clone());
        Ok(())
    }

    async fn assign_license(
        &self,
        org_id: OrgId,
        user_id: UserId,
        license_id: LicenseId,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.inner.lock().unwrap();

        let membership_id = state
            .membership_of(org_id, user_id)
            .map(|m| m.id)
            .ok_or(StoreError::NotFound)?;

        let license = state
            .licenses
            .get(&license_id)
            .filter(|l| l.org_id == org_id)
            .ok_or(StoreError::NotFound)?;
        if license.assigned_to.is_some_and(|held_by| held_by != user_id) {
            return Err(StoreError::AlreadyAssigned);
        }

        let held = state.memberships[&membership_id].assigned_license_id;
        if held.is_some_and(|held_id| held_id != license_id) {
            return Err(StoreError::AlreadyHeld);
        }

        if let Some(license) = state.licenses.get_mut(&license_id) {
            license.assigned_to = Some(user_id);
            license.updated_at = now;
        }
        if let Some(membership) = state.memberships.get_mut(&membership_id) {
            membership.assigned_license_id = Some(license_id);
        }
        Ok(())
    }

    async fn unassign_member_license(
        &self,
        org_id: OrgId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.inner.lock().unwrap();
        let membership_id = state
            .membership_of(org_id, user_id)
            .map(|m| m.id)
            .ok_or(StoreError::NotFound)?;
        state.unassign(membership_id, now);
        Ok(())
    }

    async fn list_licenses_for_org(
        &self,
        org_id: OrgId,
        request: &PageRequest,
    ) -> StoreResult<Page<LicenseRecord>> {
        let state = self.inner.lock().unwrap();
        let records = license_records(&state, Some(org_id));
        Ok(finish_license_listing(records, request, false))
    }

    async fn list_all_licenses(&self, request: &PageRequest) -> StoreResult<Page<LicenseRecord>> {
        let state = self.inner.lock().unwrap();
        let records = license_records(&state, None);
        Ok(finish_license_listing(records, request, true))
    }

    async fn renew_expired_licenses(
        &self,
        expiration_minutes: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<License>> {
        let mut state = self.inner.lock().unwrap();
        let mut renewed = Vec::new();
        for license in state.licenses.values_mut() {
            if license.is_renewable(now) {
                license.renew(expiration_minutes, now);
                renewed.push(license.clone());
            }
        }
        Ok(renewed)
    }
}

/// (record, org name lower-cased) pairs for listing/search.
fn license_records(state: &State, org_id: Option<OrgId>) -> Vec<(LicenseRecord, String)> {
    state
        .licenses
        .values()
        .filter(|l| org_id.is_none_or(|org| l.org_id == org))
        .map(|l| {
            let assignee_email = l
                .assigned_to
                .and_then(|id| state.users.get(&id))
                .map(|u| u.email.clone());
            let org_name = state
                .orgs
                .get(&l.org_id)
                .map(|o| o.name.to_lowercase())
                .unwrap_or_default();
            (
                LicenseRecord {
                    license: l.clone(),
                    assignee_email,
                },
                org_name,
            )
        })
        .collect()
}

/// `admin_scope` widens the listing to the cross-org allow-list: search also
/// matches the organization name and `organizationid` becomes sortable.
fn finish_license_listing(
    mut records: Vec<(LicenseRecord, String)>,
    request: &PageRequest,
    admin_scope: bool,
) -> Page<LicenseRecord> {
    if let Some(term) = request.search_term() {
        records.retain(|(r, org_name)| {
            let email_hit = r
                .assignee_email
                .as_deref()
                .is_some_and(|e| e.to_lowercase().contains(&term));
            email_hit || (admin_scope && org_name.contains(&term))
        });
    }

    match request.sort_key().as_deref() {
        Some("expiresat") => records.sort_by_key(|(r, _)| r.license.expires_at),
        Some("isactive") => records.sort_by_key(|(r, _)| r.license.is_active),
        Some("autorenewal") => records.sort_by_key(|(r, _)| r.license.auto_renewal),
        Some("organizationid") if admin_scope => records.sort_by_key(|(r, _)| r.license.org_id),
        _ => records.sort_by_key(|(r, _)| r.license.created_at),
    }
    apply_direction(&mut records, request.sort_descending);

    paginate(records.into_iter().map(|(r, _)| r).collect(), request)
}

#[async_trait]
impl SettingStore for InMemoryStore {
    async fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.lock().unwrap().settings.get(key).cloned())
    }

    async fn put_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
