// storage_api/src/errors.rs

use models::HospitalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no row matched in table '{0}'")]
    NotFound(String),

    #[error("expected exactly one row in table '{0}', found {1}")]
    MultipleRows(String, usize),

    #[error("unique constraint violated on {table}.{column}")]
    UniqueViolation { table: String, column: String },

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown procedure '{0}'")]
    UnknownProcedure(String),

    #[error("procedure '{0}' rejected: {1}")]
    ProcedureFailed(String, String),

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("blob already exists at '{0}'")]
    BlobExists(String),

    #[error("no blob at '{0}'")]
    BlobNotFound(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl From<StoreError> for HospitalError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(table) => HospitalError::NotFound(format!("record in {table}")),
            StoreError::UniqueViolation { table, column } => {
                HospitalError::Duplicate(format!("{table}.{column}"))
            }
            StoreError::ProcedureFailed(_, reason) => HospitalError::Validation(reason),
            StoreError::InvalidRow(msg) => HospitalError::Validation(msg),
            other => HospitalError::Storage(other.to_string()),
        }
    }
}
