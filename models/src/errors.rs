// models/src/errors.rs

pub use thiserror::Error;

/// Error taxonomy shared by every crate in the workspace. The REST layer
/// maps variants onto HTTP status codes: `Validation`/`Duplicate`/
/// `BedUnavailable` become 400, `NotFound` 404, `PermissionDenied` 403 and
/// everything else 500.
#[derive(Debug, Error)]
pub enum HospitalError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("duplicate value for {0}")]
    Duplicate(String),

    #[error("bed {0} is not available")]
    BedUnavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl HospitalError {
    pub fn validation(msg: impl Into<String>) -> Self {
        HospitalError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        HospitalError::NotFound(what.into())
    }
}
