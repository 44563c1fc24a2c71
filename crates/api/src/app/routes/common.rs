use orglicense_auth::OrgRole;
use orglicense_core::AppError;
use orglicense_directory::User;

use crate::app::errors::ApiError;

/// Parse a role name from a request body (case-insensitive).
pub fn parse_role(value: &str) -> Result<OrgRole, ApiError> {
    value.parse().map_err(|_| {
        ApiError(AppError::bad_request(
            "Invalid role",
            "Role must be Owner, Admin, or Member",
        ))
    })
}

/// Gate for the cross-organization admin surface.
pub fn require_platform_admin(user: &User) -> Result<(), ApiError> {
    if !user.platform_role.is_admin() {
        return Err(ApiError(AppError::forbidden(
            "Insufficient permissions",
            "Platform administrator role required",
        )));
    }
    Ok(())
}
