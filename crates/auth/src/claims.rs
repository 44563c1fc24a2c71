//! Bearer-token verification.
//!
//! The system never issues credentials; an external identity provider does.
//! This module turns a presented token into verified [`IdentityClaims`] or an
//! error. Verification is behind a trait so transports and tests can swap the
//! mechanism.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::roles::PlatformRole;

/// The verified identity a request acts as.
///
/// Claims are the source of truth on every request; the stored user record is
/// merely a projection of the latest claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    /// Stable identifier assigned by the identity provider.
    pub external_id: String,
    pub email: String,
    pub platform_role: PlatformRole,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token is invalid")]
    Invalid,
}

/// Verifies a bearer token and yields the identity it proves.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<IdentityClaims, TokenError>;
}

/// Wire-level JWT claims this system expects after signature verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtPayload {
    /// Subject: the external identity.
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub role: String,
    /// Expiry as a unix timestamp; enforced during verification.
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

/// HS256 JWT verification via `jsonwebtoken`.
pub struct Hs256TokenVerifier {
    key: jsonwebtoken::DecodingKey,
    validation: jsonwebtoken::Validation,
}

impl Hs256TokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            key: jsonwebtoken::DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl TokenVerifier for Hs256TokenVerifier {
    fn verify(&self, token: &str) -> Result<IdentityClaims, TokenError> {
        let data = jsonwebtoken::decode::<JwtPayload>(token, &self.key, &self.validation)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        let payload = data.claims;
        if payload.sub.trim().is_empty() || payload.email.trim().is_empty() {
            return Err(TokenError::Invalid);
        }

        Ok(IdentityClaims {
            external_id: payload.sub,
            email: payload.email,
            platform_role: PlatformRole::from_claim(&payload.role),
        })
    }
}
