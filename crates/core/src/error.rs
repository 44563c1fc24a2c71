//! Application error taxonomy.

use thiserror::Error;

/// Result type used across the application layer.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error.
///
/// Every business failure carries a short title and a human-readable detail;
/// the HTTP boundary maps each variant to its status category. `Internal`
/// wraps anything unexpected and must never leak its contents to callers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Validation or business-rule violation (HTTP 400).
    #[error("{title}: {detail}")]
    BadRequest { title: String, detail: String },

    /// No verified identity (HTTP 401).
    #[error("{title}: {detail}")]
    Unauthorized { title: String, detail: String },

    /// Verified identity but insufficient rights (HTTP 403).
    #[error("{title}: {detail}")]
    Forbidden { title: String, detail: String },

    /// A referenced resource does not exist (HTTP 404).
    #[error("{title}: {detail}")]
    NotFound { title: String, detail: String },

    /// Unexpected failure (HTTP 500); logged in full, reported generically.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_request(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::BadRequest {
            title: title.into(),
            detail: detail.into(),
        }
    }

    pub fn unauthorized(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Unauthorized {
            title: title.into(),
            detail: detail.into(),
        }
    }

    pub fn forbidden(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Forbidden {
            title: title.into(),
            detail: detail.into(),
        }
    }

    pub fn not_found(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotFound {
            title: title.into(),
            detail: detail.into(),
        }
    }

    /// Status code the HTTP boundary maps this error to.
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Internal(_) => 500,
        }
    }

    /// Short title for the error response.
    pub fn title(&self) -> &str {
        match self {
            Self::BadRequest { title, .. }
            | Self::Unauthorized { title, .. }
            | Self::Forbidden { title, .. }
            | Self::NotFound { title, .. } => title,
            Self::Internal(_) => "An error occurred while processing your request",
        }
    }

    /// Human-readable detail for the error response.
    ///
    /// Internal errors report a generic detail; the real cause only goes to
    /// the logs.
    pub fn detail(&self) -> &str {
        match self {
            Self::BadRequest { detail, .. }
            | Self::Unauthorized { detail, .. }
            | Self::Forbidden { detail, .. }
            | Self::NotFound { detail, .. } => detail,
            Self::Internal(_) => "An unexpected error occurred. Please try again later.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(AppError::bad_request("a", "b").status(), 400);
        assert_eq!(AppError::unauthorized("a", "b").status(), 401);
        assert_eq!(AppError::forbidden("a", "b").status(), 403);
        assert_eq!(AppError::not_found("a", "b").status(), 404);
        assert_eq!(AppError::Internal(anyhow::anyhow!("boom")).status(), 500);
    }

    #[test]
    fn internal_detail_does_not_leak_cause() {
        let err = AppError::Internal(anyhow::anyhow!("connection refused on 10.0.0.3"));
        assert!(!err.detail().contains("10.0.0.3"));
    }
}
