use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a member within one organization.
///
/// Roles form a total order: `Member < Admin < Owner`. Every "Owner or
/// Admin" gate in the system is expressed as `role >= Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrgRole {
    Member,
    Admin,
    Owner,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "Member",
            Self::Admin => "Admin",
            Self::Owner => "Owner",
        }
    }
}

impl core::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("role must be Owner, Admin, or Member")]
pub struct ParseRoleError;

impl FromStr for OrgRole {
    type Err = ParseRoleError;

    /// Case-insensitive parse; anything outside the three roles is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" => Ok(Self::Member),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            _ => Err(ParseRoleError),
        }
    }
}

/// Platform-wide role carried in the identity claims.
///
/// Distinct from [`OrgRole`]: it gates the cross-organization admin surface
/// (license administration), not anything inside a single organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformRole {
    User,
    Admin,
}

impl PlatformRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Admin => "Admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Claims are the source of truth but may carry arbitrary role strings;
    /// anything that is not "Admin" is treated as a regular user.
    pub fn from_claim(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::User
        }
    }
}

impl core::fmt::Display for PlatformRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_roles_are_totally_ordered() {
        assert!(OrgRole::Member < OrgRole::Admin);
        assert!(OrgRole::Admin < OrgRole::Owner);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("owner".parse::<OrgRole>().unwrap(), OrgRole::Owner);
        assert_eq!("ADMIN".parse::<OrgRole>().unwrap(), OrgRole::Admin);
        assert_eq!(" Member ".parse::<OrgRole>().unwrap(), OrgRole::Member);
        assert!("superuser".parse::<OrgRole>().is_err());
    }

    #[test]
    fn unknown_platform_role_claims_degrade_to_user() {
        assert_eq!(PlatformRole::from_claim("admin"), PlatformRole::Admin);
        assert_eq!(PlatformRole::from_claim("root"), PlatformRole::User);
        assert_eq!(PlatformRole::from_claim(""), PlatformRole::User);
    }
}
