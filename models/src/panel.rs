// models/src/panel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::HospitalError;

/// Document kinds a panel can carry in blob storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelDocumentType {
    Contract,
    RateList,
}

impl fmt::Display for PanelDocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelDocumentType::Contract => write!(f, "contract"),
            PanelDocumentType::RateList => write!(f, "rate_list"),
        }
    }
}

impl FromStr for PanelDocumentType {
    type Err = HospitalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "contract" => Ok(PanelDocumentType::Contract),
            "rate_list" => Ok(PanelDocumentType::RateList),
            other => Err(HospitalError::Validation(format!(
                "unknown panel document type '{other}'"
            ))),
        }
    }
}

/// An insurance or third-party payer with contracted rates. `name` is
/// unique across panels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panel {
    pub id: Uuid,
    pub name: String,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub portal_url: Option<String>,
    pub portal_notes: Option<String>,
    /// Blob-storage path of the uploaded contract document, if any.
    pub contract_doc: Option<String>,
    /// Blob-storage path of the uploaded rate list, if any.
    pub rate_list_doc: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
