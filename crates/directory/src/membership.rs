use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orglicense_auth::OrgRole;
use orglicense_core::{LicenseId, MembershipId, OrgId, UserId};

/// A user's role-scoped association with one organization.
///
/// Unique per (organization, user). Holds a non-owning reference to at most
/// one license; the license record owns the assignment edge and both sides
/// are kept in lock-step by every assign/unassign operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub role: OrgRole,
    pub joined_at: DateTime<Utc>,
    pub assigned_license_id: Option<LicenseId>,
}

impl Membership {
    pub fn new(org_id: OrgId, user_id: UserId, role: OrgRole, now: DateTime<Utc>) -> Self {
        Self {
            id: MembershipId::new(),
            org_id,
            user_id,
            role,
            joined_at: now,
            assigned_license_id: None,
        }
    }
}
