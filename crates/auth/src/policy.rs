//! Role policy checks.
//!
//! Pure functions: no IO, no panics, no business state. Callers resolve the
//! membership (or its absence) and the policy decides.

use thiserror::Error;

use orglicense_core::AppError;

use crate::roles::OrgRole;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The caller has no membership in the target organization.
    #[error("not a member")]
    NotAMember,

    /// The caller is a member but below the required role.
    #[error("insufficient permissions")]
    InsufficientRole { required: OrgRole },
}

impl From<PolicyError> for AppError {
    /// Both variants surface as HTTP 403, with distinct detail messages.
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::NotAMember => AppError::forbidden(
                "Not a member",
                "You are not a member of this organization",
            ),
            PolicyError::InsufficientRole { required } => AppError::forbidden(
                "Insufficient permissions",
                format!(
                    "You must be {} or higher to perform this action",
                    required.as_str()
                ),
            ),
        }
    }
}

/// Require any membership at all; returns the role for further checks.
pub fn require_member(membership: Option<OrgRole>) -> Result<OrgRole, PolicyError> {
    membership.ok_or(PolicyError::NotAMember)
}

/// Require a membership with at least `minimum` role.
pub fn require_min_role(membership: Option<OrgRole>, minimum: OrgRole) -> Result<OrgRole, PolicyError> {
    let role = require_member(membership)?;
    if role < minimum {
        return Err(PolicyError::InsufficientRole { required: minimum });
    }
    Ok(role)
}

/// Require that `caller` may grant `target` to someone else.
///
/// Granting Owner requires the caller to already be Owner; Admins may grant
/// up to Admin.
pub fn require_grantable_role(caller: OrgRole, target: OrgRole) -> Result<(), PolicyError> {
    if target == OrgRole::Owner && caller != OrgRole::Owner {
        return Err(PolicyError::InsufficientRole {
            required: OrgRole::Owner,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_membership_is_not_a_member() {
        assert_eq!(
            require_min_role(None, OrgRole::Member).unwrap_err(),
            PolicyError::NotAMember
        );
    }

    #[test]
    fn owner_passes_every_gate() {
        for minimum in [OrgRole::Member, OrgRole::Admin, OrgRole::Owner] {
            assert!(require_min_role(Some(OrgRole::Owner), minimum).is_ok());
        }
    }

    #[test]
    fn member_fails_admin_gate() {
        let err = require_min_role(Some(OrgRole::Member), OrgRole::Admin).unwrap_err();
        assert_eq!(
            err,
            PolicyError::InsufficientRole {
                required: OrgRole::Admin
            }
        );
    }

    #[test]
    fn admin_passes_admin_gate() {
        assert!(require_min_role(Some(OrgRole::Admin), OrgRole::Admin).is_ok());
    }

    #[test]
    fn only_owners_grant_owner() {
        assert!(require_grantable_role(OrgRole::Owner, OrgRole::Owner).is_ok());
        assert!(require_grantable_role(OrgRole::Admin, OrgRole::Owner).is_err());
        assert!(require_grantable_role(OrgRole::Admin, OrgRole::Admin).is_ok());
        assert!(require_grantable_role(OrgRole::Admin, OrgRole::Member).is_ok());
    }

    #[test]
    fn policy_errors_map_to_distinct_forbidden_details() {
        let not_member: AppError = PolicyError::NotAMember.into();
        let too_low: AppError = PolicyError::InsufficientRole {
            required: OrgRole::Admin,
        }
        .into();
        assert_eq!(not_member.status(), 403);
        assert_eq!(too_low.status(), 403);
        assert_ne!(not_member.detail(), too_low.detail());
    }
}
