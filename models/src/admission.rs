// models/src/admission.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::HospitalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    Admitted,
    Discharged,
    /// Left against medical advice.
    Lama,
    Expired,
}

impl AdmissionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AdmissionStatus::Admitted)
    }
}

impl fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionStatus::Admitted => write!(f, "admitted"),
            AdmissionStatus::Discharged => write!(f, "discharged"),
            AdmissionStatus::Lama => write!(f, "lama"),
            AdmissionStatus::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for AdmissionStatus {
    type Err = HospitalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admitted" => Ok(AdmissionStatus::Admitted),
            "discharged" => Ok(AdmissionStatus::Discharged),
            "lama" => Ok(AdmissionStatus::Lama),
            "expired" => Ok(AdmissionStatus::Expired),
            other => Err(HospitalError::Validation(format!(
                "unknown admission status '{other}'"
            ))),
        }
    }
}

/// An in-patient admission.
///
/// Invariant: `discharged_at` is `None` iff `status == Admitted`. Once a
/// terminal status is set the admission never re-opens; a returning patient
/// gets a fresh admission with a fresh number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admission {
    pub id: Uuid,
    /// Human-readable number, `IPD/<YYMM>/<seq>`.
    pub admission_no: String,
    pub patient_id: Uuid,
    pub bed_id: Uuid,
    pub status: AdmissionStatus,
    pub admitted_at: DateTime<Utc>,
    pub discharged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub doctors: Vec<Uuid>,
    pub panel_id: Option<Uuid>,
    pub attendant_name: Option<String>,
    pub attendant_phone: Option<String>,
    pub attendant_id_doc: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Admission {
    pub fn is_active(&self) -> bool {
        self.status == AdmissionStatus::Admitted
    }

    /// Checks the discharge invariant for this row in isolation.
    pub fn discharge_consistent(&self) -> bool {
        match self.status {
            AdmissionStatus::Admitted => self.discharged_at.is_none(),
            _ => self.discharged_at.is_some(),
        }
    }
}
