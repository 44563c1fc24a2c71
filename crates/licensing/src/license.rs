use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use orglicense_core::{AppError, AppResult, LicenseId, OrgId, UserId};

/// Fallback when the persisted setting is absent or unparseable.
pub const DEFAULT_EXPIRATION_MINUTES: u32 = 10;

/// Key of the expiration-minutes entry in the settings store.
pub const EXPIRATION_MINUTES_KEY: &str = "license_expiration_minutes";

const MAX_EXPIRATION_MINUTES: u32 = 525_600; // one year

/// A renewable, assignable entitlement owned by an organization.
///
/// Lifecycle: a license stays `is_active` through expiry (the sweep or an
/// admin update pushes `expires_at` forward); cancellation is terminal and
/// always disables auto-renewal. Assignment links the license to at most one
/// member, mirrored on the membership's `assigned_license_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub id: LicenseId,
    pub org_id: OrgId,
    pub assigned_to: Option<UserId>,
    pub expires_at: DateTime<Utc>,
    pub auto_renewal: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl License {
    pub fn issue(org_id: OrgId, auto_renewal: bool, expiration_minutes: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: LicenseId::new(),
            org_id,
            assigned_to: None,
            expires_at: now + Duration::minutes(i64::from(expiration_minutes)),
            auto_renewal,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Eligible for the renewal sweep: active, auto-renewing, and expired.
    pub fn is_renewable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.auto_renewal && self.is_expired(now)
    }

    /// Apply an admin update; each field is independently optional.
    ///
    /// A provided `expires_at` must be strictly in the future.
    pub fn apply_update(
        &mut self,
        expires_at: Option<DateTime<Utc>>,
        auto_renewal: Option<bool>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if let Some(expires_at) = expires_at {
            if expires_at <= now {
                return Err(AppError::bad_request(
                    "Invalid expiration date",
                    "Expiration date must be in the future",
                ));
            }
            self.expires_at = expires_at;
        }
        if let Some(auto_renewal) = auto_renewal {
            self.auto_renewal = auto_renewal;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Cancel: one-way, idempotent, always disables auto-renewal.
    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.auto_renewal = false;
        self.updated_at = now;
    }

    /// Extend an expired license by the current expiration window.
    pub fn renew(&mut self, expiration_minutes: u32, now: DateTime<Utc>) {
        self.expires_at = now + Duration::minutes(i64::from(expiration_minutes));
        self.updated_at = now;
    }
}

/// Admin-supplied expiration minutes must be within 1..=525600 (one year).
pub fn validate_expiration_minutes(minutes: i64) -> AppResult<u32> {
    if !(1..=i64::from(MAX_EXPIRATION_MINUTES)).contains(&minutes) {
        return Err(AppError::bad_request(
            "Invalid expiration minutes",
            "Expiration minutes must be between 1 and 525600",
        ));
    }
    Ok(minutes as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes_ago(m: i64) -> DateTime<Utc> {
        Utc::now() - Duration::minutes(m)
    }

    #[test]
    fn issue_sets_expiry_from_the_window() {
        let now = Utc::now();
        let license = License::issue(OrgId::new(), true, 10, now);
        assert_eq!(license.expires_at, now + Duration::minutes(10));
        assert!(license.is_active);
        assert_eq!(license.assigned_to, None);
        assert!(!license.is_expired(now));
    }

    #[test]
    fn renewable_requires_active_auto_renewal_and_expiry() {
        let now = Utc::now();
        let mut license = License::issue(OrgId::new(), true, 10, minutes_ago(30));
        assert!(license.is_renewable(now));

        license.auto_renewal = false;
        assert!(!license.is_renewable(now));

        license.auto_renewal = true;
        license.cancel(now);
        assert!(!license.is_renewable(now));
    }

    #[test]
    fn renew_pushes_expiry_forward() {
        let now = Utc::now();
        let mut license = License::issue(OrgId::new(), true, 10, minutes_ago(30));
        license.renew(10, now);
        assert_eq!(license.expires_at, now + Duration::minutes(10));
        assert!(license.is_active);
        assert!(!license.is_renewable(now));
    }

    #[test]
    fn cancel_is_idempotent_and_one_way() {
        let now = Utc::now();
        let mut license = License::issue(OrgId::new(), true, 10, now);
        license.cancel(now);
        assert!(!license.is_active);
        assert!(!license.auto_renewal);

        license.cancel(now);
        assert!(!license.is_active);
        assert!(!license.auto_renewal);
    }

    #[test]
    fn update_rejects_past_expiry() {
        let now = Utc::now();
        let mut license = License::issue(OrgId::new(), false, 10, now);
        let err = license
            .apply_update(Some(now - Duration::minutes(1)), None, now)
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn update_fields_are_independent() {
        let now = Utc::now();
        let mut license = License::issue(OrgId::new(), false, 10, now);
        let original_expiry = license.expires_at;

        license.apply_update(None, Some(true), now).unwrap();
        assert!(license.auto_renewal);
        assert_eq!(license.expires_at, original_expiry);

        let new_expiry = now + Duration::days(30);
        license.apply_update(Some(new_expiry), None, now).unwrap();
        assert_eq!(license.expires_at, new_expiry);
        assert!(license.auto_renewal);
    }

    #[test]
    fn expiration_minutes_bounds() {
        assert!(validate_expiration_minutes(0).is_err());
        assert!(validate_expiration_minutes(-5).is_err());
        assert!(validate_expiration_minutes(525_601).is_err());
        assert_eq!(validate_expiration_minutes(1).unwrap(), 1);
        assert_eq!(validate_expiration_minutes(525_600).unwrap(), 525_600);
    }
}
