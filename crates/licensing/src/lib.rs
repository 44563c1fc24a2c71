//! `orglicense-licensing` — pure domain model for licenses and the
//! expiration-minutes setting.

pub mod license;

pub use license::{
    validate_expiration_minutes, License, DEFAULT_EXPIRATION_MINUTES, EXPIRATION_MINUTES_KEY,
};
