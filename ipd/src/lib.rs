// ipd/src/lib.rs
//
// In-patient department core: the bed/ward registry, the admission
// lifecycle workflow, admission numbering, the ward-occupancy and
// bed-history read models, and the patient/panel/doctor/expense services.
// Everything here talks to the hosted database through the `storage_api`
// traits; multi-table transitions go through its atomic procedures.

pub mod doctors;
pub mod expenses;
pub mod history;
pub mod lifecycle;
pub mod numbering;
pub mod panels;
pub mod patients;
pub mod registry;
pub mod stats;

pub use history::BedHistoryView;
pub use lifecycle::{AdmissionService, AdmissionUpdate, NewAdmission};
pub use registry::{BedCounts, BedRegistry, BedUpdate, NewBed};
pub use stats::{WardStats, WardStatsAggregator};
