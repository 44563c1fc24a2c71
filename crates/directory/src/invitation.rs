use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use orglicense_auth::OrgRole;
use orglicense_core::{AppError, AppResult, InvitationId, OrgId, UserId};

/// Invitations expire this many days after creation.
pub const INVITATION_TTL_DAYS: i64 = 7;

const TOKEN_BYTES: usize = 32;
const EMAIL_MAX: usize = 256;

/// A time-boxed, single-use token offering a role in an organization to an
/// email address.
///
/// Pending is the only stored state; acceptance, cancellation, and expiry all
/// delete the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub org_id: OrgId,
    /// Normalized (trimmed, lower-cased) recipient address.
    pub email: String,
    /// Unguessable, URL-safe token delivered by email.
    pub token: String,
    pub role: OrgRole,
    pub expires_at: DateTime<Utc>,
    pub invited_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    pub fn issue(
        org_id: OrgId,
        email: &str,
        role: OrgRole,
        invited_by: UserId,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let email = validate_email(email)?;
        Ok(Self {
            id: InvitationId::new(),
            org_id,
            email,
            token: generate_token(),
            role,
            expires_at: now + Duration::days(INVITATION_TTL_DAYS),
            invited_by: Some(invited_by),
            created_at: now,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the invitation was addressed to `email` (case-insensitive).
    pub fn is_addressed_to(&self, email: &str) -> bool {
        self.email == normalize_email(email)
    }
}

/// Trim and lower-case an address for comparison and storage.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> AppResult<String> {
    let email = normalize_email(email);
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if email.is_empty() || email.len() > EMAIL_MAX || !well_formed {
        return Err(AppError::bad_request(
            "Invalid email",
            "A valid email address is required",
        ));
    }
    Ok(email)
}

/// 32 random bytes, URL-safe base64, no padding.
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn issue(email: &str) -> AppResult<Invitation> {
        Invitation::issue(OrgId::new(), email, OrgRole::Member, UserId::new(), Utc::now())
    }

    #[test]
    fn issue_normalizes_the_email() {
        let inv = issue("  B@X.com ").unwrap();
        assert_eq!(inv.email, "b@x.com");
    }

    #[test]
    fn issue_rejects_malformed_emails() {
        assert!(issue("").is_err());
        assert!(issue("no-at-sign").is_err());
        assert!(issue("@x.com").is_err());
        assert!(issue("a@nodot").is_err());
    }

    #[test]
    fn expiry_is_seven_days_out() {
        let now = Utc::now();
        let inv = Invitation::issue(OrgId::new(), "b@x.com", OrgRole::Member, UserId::new(), now).unwrap();
        assert_eq!(inv.expires_at, now + Duration::days(7));
        assert!(!inv.is_expired(now));
        assert!(inv.is_expired(now + Duration::days(7)));
    }

    #[test]
    fn address_match_is_case_insensitive() {
        let inv = issue("b@x.com").unwrap();
        assert!(inv.is_addressed_to("B@X.COM"));
        assert!(!inv.is_addressed_to("c@x.com"));
    }

    #[test]
    fn tokens_are_unique_across_issues() {
        let a = issue("a@x.com").unwrap();
        let b = issue("a@x.com").unwrap();
        assert_ne!(a.token, b.token);
    }

    proptest! {
        /// Property: generated tokens are always 43 URL-safe characters with
        /// no padding, regardless of how many are drawn.
        #[test]
        fn tokens_are_url_safe_and_unpadded(_n in 0u8..16) {
            let token = generate_token();
            prop_assert_eq!(token.len(), 43);
            prop_assert!(token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }
}
