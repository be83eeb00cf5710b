// ipd/src/numbering.rs
//
// Human-readable record numbers. Sequences live in the backing store as
// upsert-increment counters (`next_number`/`peek_number` procedures), so
// concurrent admits cannot mint the same number; this module only owns the
// scope keys and the formatting.

use chrono::{DateTime, Datelike, Utc};
use models::HospitalError;
use serde_json::json;
use storage_api::RowStore;

/// Counter scope for admissions in the month of `at`, e.g. `ipd:2402`.
/// A new month means a new scope, which is what resets the sequence.
pub fn admission_scope(at: DateTime<Utc>) -> String {
    format!("ipd:{}", year_month(at))
}

/// Global counter scope for patient numbers.
pub const PATIENT_SCOPE: &str = "patient";

pub fn format_admission_no(at: DateTime<Utc>, seq: u64) -> String {
    format!("IPD/{}/{seq:03}", year_month(at))
}

pub fn format_patient_no(seq: u64) -> String {
    format!("PAT/{seq:04}")
}

fn year_month(at: DateTime<Utc>) -> String {
    format!("{:02}{:02}", at.year() % 100, at.month())
}

/// What the next admission number for the month of `at` would be, without
/// consuming it. Shown in the admit form; the actual number is assigned by
/// the `admit_patient` procedure.
pub async fn peek_admission_no(
    store: &dyn RowStore,
    at: DateTime<Utc>,
) -> Result<String, HospitalError> {
    let result = store
        .rpc("peek_number", json!({ "scope": admission_scope(at) }))
        .await?;
    let seq = result
        .get("seq")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| HospitalError::Storage("peek_number returned no sequence".into()))?;
    Ok(format_admission_no(at, seq))
}

/// Consumes the next patient sequence value.
pub async fn next_patient_no(store: &dyn RowStore) -> Result<String, HospitalError> {
    let result = store
        .rpc("next_number", json!({ "scope": PATIENT_SCOPE }))
        .await?;
    let seq = result
        .get("seq")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| HospitalError::Storage("next_number returned no sequence".into()))?;
    Ok(format_patient_no(seq))
}
