use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orglicense_auth::{IdentityClaims, PlatformRole};
use orglicense_core::UserId;

/// Identity record, created lazily on first authenticated request.
///
/// The identity provider's claims are authoritative: email and platform role
/// are refreshed from the claims whenever they drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub external_id: String,
    pub email: String,
    pub platform_role: PlatformRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Materialize a first-seen identity.
    pub fn from_claims(claims: &IdentityClaims, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            external_id: claims.external_id.clone(),
            email: claims.email.clone(),
            platform_role: claims.platform_role,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh the stored projection from the latest claims.
    ///
    /// Returns `true` when something changed and the record needs persisting.
    pub fn refresh_from_claims(&mut self, claims: &IdentityClaims, now: DateTime<Utc>) -> bool {
        if self.email == claims.email && self.platform_role == claims.platform_role {
            return false;
        }
        self.email = claims.email.clone();
        self.platform_role = claims.platform_role;
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(email: &str, role: PlatformRole) -> IdentityClaims {
        IdentityClaims {
            external_id: "auth0|u1".to_string(),
            email: email.to_string(),
            platform_role: role,
        }
    }

    #[test]
    fn refresh_is_a_no_op_when_claims_match() {
        let now = Utc::now();
        let mut user = User::from_claims(&claims("a@x.com", PlatformRole::User), now);
        let before = user.updated_at;
        assert!(!user.refresh_from_claims(&claims("a@x.com", PlatformRole::User), now + chrono::Duration::hours(1)));
        assert_eq!(user.updated_at, before);
    }

    #[test]
    fn refresh_applies_changed_email_and_role() {
        let now = Utc::now();
        let mut user = User::from_claims(&claims("a@x.com", PlatformRole::User), now);
        let later = now + chrono::Duration::hours(1);
        assert!(user.refresh_from_claims(&claims("b@x.com", PlatformRole::Admin), later));
        assert_eq!(user.email, "b@x.com");
        assert_eq!(user.platform_role, PlatformRole::Admin);
        assert_eq!(user.updated_at, later);
    }
}
