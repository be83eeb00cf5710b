// models/src/lib.rs

pub mod admission;
pub mod bed;
pub mod bed_history;
pub mod doctor;
pub mod errors;
pub mod expense;
pub mod panel;
pub mod patient;

pub use admission::{Admission, AdmissionStatus};
pub use bed::{Bed, BedStatus};
pub use bed_history::BedHistoryEntry;
pub use doctor::Doctor;
pub use errors::HospitalError;
pub use expense::Expense;
pub use panel::{Panel, PanelDocumentType};
pub use patient::Patient;
