//! `orglicense-directory` — pure domain model for identities, organizations,
//! memberships, and invitations.
//!
//! No storage or transport concerns; the infra crate persists these types and
//! enforces the multi-row invariants transactionally.

pub mod invitation;
pub mod membership;
pub mod organization;
pub mod user;

pub use invitation::{normalize_email, Invitation, INVITATION_TTL_DAYS};
pub use membership::Membership;
pub use organization::Organization;
pub use user::User;
