// storage_api/src/tables.rs

pub const BEDS: &str = "beds";
pub const ADMISSIONS: &str = "admissions";
pub const BED_HISTORY: &str = "bed_history";
pub const PATIENTS: &str = "patients";
pub const PANELS: &str = "panels";
pub const DOCTORS: &str = "doctors";
pub const EXPENSES: &str = "expenses";

pub const ALL: &[&str] = &[BEDS, ADMISSIONS, BED_HISTORY, PATIENTS, PANELS, DOCTORS, EXPENSES];
