//! `orglicense-auth` — pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage. Token
//! issuance lives outside the system; only verification of bearer tokens and
//! the role policy live here.

pub mod claims;
pub mod policy;
pub mod roles;

pub use claims::{Hs256TokenVerifier, IdentityClaims, TokenError, TokenVerifier};
pub use policy::{require_grantable_role, require_member, require_min_role, PolicyError};
pub use roles::{OrgRole, PlatformRole};
