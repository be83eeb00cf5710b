// models/src/bed.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::HospitalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BedStatus {
    Available,
    Occupied,
    Maintenance,
}

impl fmt::Display for BedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BedStatus::Available => write!(f, "available"),
            BedStatus::Occupied => write!(f, "occupied"),
            BedStatus::Maintenance => write!(f, "maintenance"),
        }
    }
}

impl FromStr for BedStatus {
    type Err = HospitalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "available" => Ok(BedStatus::Available),
            "occupied" => Ok(BedStatus::Occupied),
            "maintenance" => Ok(BedStatus::Maintenance),
            other => Err(HospitalError::Validation(format!(
                "unknown bed status '{other}'"
            ))),
        }
    }
}

/// A single physical bed. Wards are not stored separately; they are the
/// distinct `ward` values across beds.
///
/// Invariant: `status == Occupied` iff `current_admission` is set, and that
/// admission is still in the Admitted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bed {
    pub id: Uuid,
    pub ward: String,
    pub bed_number: String,
    pub status: BedStatus,
    pub current_admission: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bed {
    pub fn new(ward: impl Into<String>, bed_number: impl Into<String>) -> Self {
        let now = Utc::now();
        Bed {
            id: Uuid::new_v4(),
            ward: ward.into(),
            bed_number: bed_number.into(),
            status: BedStatus::Available,
            current_admission: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == BedStatus::Available
    }

    /// Checks the occupancy invariant for this row in isolation.
    pub fn occupancy_consistent(&self) -> bool {
        (self.status == BedStatus::Occupied) == self.current_admission.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_bed_status_case_insensitively() {
        assert_eq!("Available".parse::<BedStatus>().unwrap(), BedStatus::Available);
        assert_eq!(" occupied ".parse::<BedStatus>().unwrap(), BedStatus::Occupied);
        assert!("broken".parse::<BedStatus>().is_err());
    }

    #[test]
    fn should_flag_inconsistent_occupancy() {
        let mut bed = Bed::new("General", "G-01");
        assert!(bed.occupancy_consistent());
        bed.status = BedStatus::Occupied;
        assert!(!bed.occupancy_consistent());
        bed.current_admission = Some(Uuid::new_v4());
        assert!(bed.occupancy_consistent());
    }
}
