//! `orglicense-infra` — persistence and the operational services built on it.
//!
//! The store is a trait boundary: the in-memory implementation backs tests
//! and local development, the Postgres implementation backs deployments.
//! Every compound store operation is atomic within one implementation call.

pub mod identity;
pub mod invitations;
pub mod licenses;
pub mod notifier;
pub mod organizations;
pub mod settings;
pub mod store;
pub mod sweeper;

pub use identity::IdentityService;
pub use invitations::InvitationService;
pub use licenses::LicenseService;
pub use notifier::{InvitationNotifier, LogNotifier};
pub use organizations::OrganizationService;
pub use settings::ExpirationSettings;
pub use store::{
    InMemoryStore, LicenseRecord, MemberRecord, PostgresStore, Store, StoreError, StoreResult,
    UserOrgRecord,
};
pub use sweeper::{RenewalSweeper, SweeperHandle, DEFAULT_SWEEP_INTERVAL};
