//! Error types for cohort SQL compilation

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The request itself is unusable; reject it without retrying.
    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    /// Configuration defect (missing schema mapping, malformed linking rows).
    #[error("Internal compiler error: {0}")]
    Internal(String),

    #[error("Warehouse error: {0}")]
    Warehouse(String),

    #[error("Invalid criteria document: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Model(#[from] cohortql_model::Error),
}

impl Error {
    /// True when the caller sent something unusable (4xx-equivalent).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidCriteria(_) | Error::NotFound(_) | Error::Json(_) | Error::Model(_)
        )
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(error = %message, "Internal compiler error");
        Error::Internal(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_user_errors() {
        assert!(Error::InvalidCriteria("x".into()).is_user_error());
        assert!(Error::NotFound("x".into()).is_user_error());
        assert!(!Error::Internal("x".into()).is_user_error());
        assert!(!Error::Warehouse("x".into()).is_user_error());
    }

    #[test]
    fn not_found_message() {
        let err = Error::NotFound("No Cohort definition matching cohortId: 7".into());
        assert_eq!(
            err.to_string(),
            "Not Found: No Cohort definition matching cohortId: 7"
        );
    }
}
