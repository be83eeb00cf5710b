// ipd/src/lifecycle.rs
//
// Admission lifecycle: Admitted -> {Discharged, LAMA, Expired}, plus the
// in-state bed shift. Every transition that touches more than one table
// (admit, shift, discharge) goes through an atomic procedure on the
// backing store; this service validates, shapes arguments and reshapes
// results.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use models::{Admission, AdmissionStatus, BedHistoryEntry, BedStatus, HospitalError};
use storage_api::{tables, Query, RowStore};

use crate::history::{annotate, BedHistoryView};
use crate::numbering;

#[derive(Debug, Deserialize)]
pub struct NewAdmission {
    pub patient_id: Uuid,
    pub bed_id: Uuid,
    /// Defaults to now.
    pub admitted_at: Option<DateTime<Utc>>,
    pub panel_id: Option<Uuid>,
    #[serde(default)]
    pub doctors: Vec<Uuid>,
    pub attendant_name: Option<String>,
    pub attendant_phone: Option<String>,
    pub attendant_id_doc: Option<String>,
}

/// Partial edit. Status may only move between terminal values (correcting
/// a discharge type); going in or out of Admitted is the job of admit and
/// discharge. Bed state is never touched here.
#[derive(Debug, Default, Deserialize)]
pub struct AdmissionUpdate {
    pub status: Option<AdmissionStatus>,
    pub panel_id: Option<Uuid>,
    pub doctors: Option<Vec<Uuid>>,
    pub attendant_name: Option<String>,
    pub attendant_phone: Option<String>,
    pub attendant_id_doc: Option<String>,
    pub discharged_at: Option<DateTime<Utc>>,
}

pub struct AdmissionService {
    store: Arc<dyn RowStore>,
}

impl AdmissionService {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        AdmissionService { store }
    }

    pub async fn get(&self, id: Uuid) -> Result<Admission, HospitalError> {
        let row = self
            .store
            .select_single(Query::table(tables::ADMISSIONS).eq("id", id.to_string()))
            .await
            .map_err(|_| HospitalError::NotFound(format!("admission {id}")))?;
        Ok(serde_json::from_value(row)?)
    }

    /// Admissions newest-first, optionally narrowed by status or patient.
    pub async fn list(
        &self,
        status: Option<AdmissionStatus>,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<Admission>, HospitalError> {
        let mut query = Query::table(tables::ADMISSIONS).order_by("admitted_at", false);
        if let Some(status) = status {
            query = query.eq("status", json!(status));
        }
        if let Some(patient_id) = patient_id {
            query = query.eq("patient_id", patient_id.to_string());
        }
        let rows = self.store.select(query).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(HospitalError::from))
            .collect()
    }

    /// Preview of the number the next admit would receive this month.
    pub async fn next_admission_no(&self) -> Result<String, HospitalError> {
        numbering::peek_admission_no(self.store.as_ref(), Utc::now()).await
    }

    /// Creates the admission, occupies the bed and opens the first
    /// bed-history entry in one atomic unit. The availability check is
    /// repeated inside the procedure, so two concurrent admits to the same
    /// bed cannot both commit.
    pub async fn admit(&self, new: NewAdmission) -> Result<Admission, HospitalError> {
        let admitted_at = new.admitted_at.unwrap_or_else(Utc::now);
        self.verify_doctors(&new.doctors).await?;

        // Early, readable failure for the common case; the procedure is
        // what actually guarantees it.
        let bed = self.fetch_bed(new.bed_id).await?;
        if bed.get("status") != Some(&json!(BedStatus::Available)) {
            return Err(HospitalError::BedUnavailable(format!("{}", new.bed_id)));
        }

        let args = json!({
            "patient_id": new.patient_id,
            "bed_id": new.bed_id,
            "admitted_at": admitted_at,
            "panel_id": new.panel_id,
            "doctors": new.doctors,
            "attendant_name": new.attendant_name,
            "attendant_phone": new.attendant_phone,
            "attendant_id_doc": new.attendant_id_doc,
        });
        let row = self.store.rpc("admit_patient", args).await?;
        let admission: Admission = serde_json::from_value(row)?;
        info!(admission = %admission.admission_no, patient = %admission.patient_id,
              bed = %admission.bed_id, "patient admitted");
        Ok(admission)
    }

    /// Moves an active admission to another bed. Closing the old history
    /// entry, opening the new one and swapping both bed statuses commit as
    /// one unit in the `shift_bed` procedure.
    pub async fn shift_bed(
        &self,
        id: Uuid,
        new_bed_id: Uuid,
        shift_time: Option<DateTime<Utc>>,
    ) -> Result<Admission, HospitalError> {
        let admission = self.get(id).await?;
        if !admission.is_active() {
            return Err(HospitalError::validation(format!(
                "admission {} is not active",
                admission.admission_no
            )));
        }
        let shift_time = shift_time.unwrap_or_else(Utc::now);
        let open_entry = self.open_history_entry(id).await?;
        if shift_time < open_entry.from_time {
            return Err(HospitalError::validation(
                "shift time precedes the start of the current bed stay",
            ));
        }

        let args = json!({
            "admission_id": id,
            "old_bed_id": admission.bed_id,
            "new_bed_id": new_bed_id,
            "shift_time": shift_time,
        });
        let row = self.store.rpc("shift_bed", args).await?;
        let admission: Admission = serde_json::from_value(row)?;
        info!(admission = %admission.admission_no, bed = %new_bed_id, "bed shifted");
        Ok(admission)
    }

    /// Closes the admission with a terminal status, closes the open history
    /// entry and frees the bed, all in the `discharge_admission` procedure.
    pub async fn discharge(
        &self,
        id: Uuid,
        discharged_at: Option<DateTime<Utc>>,
        status: AdmissionStatus,
    ) -> Result<Admission, HospitalError> {
        if !status.is_terminal() {
            return Err(HospitalError::validation(
                "discharge status must be one of discharged, lama, expired",
            ));
        }
        let discharged_at = discharged_at.unwrap_or_else(Utc::now);
        let args = json!({
            "admission_id": id,
            "discharged_at": discharged_at,
            "status": status,
        });
        let row = self.store.rpc("discharge_admission", args).await?;
        let admission: Admission = serde_json::from_value(row)?;
        info!(admission = %admission.admission_no, status = %status, "patient discharged");
        Ok(admission)
    }

    /// Partial update of panel/doctors/attendant fields and, for terminal
    /// admissions, the discharge record. Never touches bed state.
    pub async fn edit(&self, id: Uuid, update: AdmissionUpdate) -> Result<Admission, HospitalError> {
        let admission = self.get(id).await?;
        let mut patch = serde_json::Map::new();

        if let Some(status) = update.status {
            if !admission.status.is_terminal() || !status.is_terminal() {
                return Err(HospitalError::validation(
                    "status can only be corrected between terminal values; use discharge",
                ));
            }
            patch.insert("status".into(), json!(status));
        }
        if let Some(discharged_at) = update.discharged_at {
            if !admission.status.is_terminal() {
                return Err(HospitalError::validation(
                    "discharge time can only be edited on a terminal admission",
                ));
            }
            if discharged_at < admission.admitted_at {
                return Err(HospitalError::validation(
                    "discharge time precedes admission time",
                ));
            }
            patch.insert("discharged_at".into(), json!(discharged_at));
        }
        if let Some(panel_id) = update.panel_id {
            self.store
                .select_single(Query::table(tables::PANELS).eq("id", panel_id.to_string()))
                .await
                .map_err(|_| HospitalError::NotFound(format!("panel {panel_id}")))?;
            patch.insert("panel_id".into(), json!(panel_id));
        }
        if let Some(doctors) = update.doctors {
            self.verify_doctors(&doctors).await?;
            patch.insert("doctors".into(), json!(doctors));
        }
        if let Some(name) = update.attendant_name {
            patch.insert("attendant_name".into(), json!(name));
        }
        if let Some(phone) = update.attendant_phone {
            patch.insert("attendant_phone".into(), json!(phone));
        }
        if let Some(doc) = update.attendant_id_doc {
            patch.insert("attendant_id_doc".into(), json!(doc));
        }
        if patch.is_empty() {
            return Ok(admission);
        }
        patch.insert("updated_at".into(), json!(Utc::now()));

        let row = self
            .store
            .update(tables::ADMISSIONS, id, Value::Object(patch))
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Removes a terminal admission and its history in the
    /// `delete_admission` procedure. An active admission still owns a bed
    /// and must be discharged first.
    pub async fn delete(&self, id: Uuid) -> Result<(), HospitalError> {
        let admission = self.get(id).await?;
        if admission.is_active() {
            return Err(HospitalError::validation(format!(
                "admission {} is active; discharge it before deleting",
                admission.admission_no
            )));
        }
        self.store
            .rpc("delete_admission", json!({ "admission_id": id }))
            .await?;
        Ok(())
    }

    /// History entries for one admission, oldest first, annotated with
    /// computed durations.
    pub async fn bed_history(&self, id: Uuid) -> Result<Vec<BedHistoryView>, HospitalError> {
        self.get(id).await?;
        let entries = self.history_entries(id).await?;
        Ok(annotate(entries, Utc::now()))
    }

    async fn history_entries(&self, id: Uuid) -> Result<Vec<BedHistoryEntry>, HospitalError> {
        let rows = self
            .store
            .select(
                Query::table(tables::BED_HISTORY)
                    .eq("admission_id", id.to_string())
                    .order_by("from_time", true),
            )
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(HospitalError::from))
            .collect()
    }

    async fn open_history_entry(&self, id: Uuid) -> Result<BedHistoryEntry, HospitalError> {
        self.history_entries(id)
            .await?
            .into_iter()
            .find(BedHistoryEntry::is_open)
            .ok_or_else(|| {
                HospitalError::Storage(format!("admission {id} has no open bed-history entry"))
            })
    }

    async fn verify_doctors(&self, doctors: &[Uuid]) -> Result<(), HospitalError> {
        for doctor_id in doctors {
            self.store
                .select_single(Query::table(tables::DOCTORS).eq("id", doctor_id.to_string()))
                .await
                .map_err(|_| HospitalError::NotFound(format!("doctor {doctor_id}")))?;
        }
        Ok(())
    }

    async fn fetch_bed(&self, id: Uuid) -> Result<Value, HospitalError> {
        self.store
            .select_single(Query::table(tables::BEDS).eq("id", id.to_string()))
            .await
            .map_err(|_| HospitalError::NotFound(format!("bed {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BedRegistry, NewBed};
    use chrono::TimeZone;
    use storage_api::InMemoryBackend;

    struct Fixture {
        store: Arc<InMemoryBackend>,
        admissions: AdmissionService,
        registry: BedRegistry,
        patient: Uuid,
        beds: Vec<Uuid>,
    }

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, day, hour, 0, 0).unwrap()
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryBackend::new());
        let admissions = AdmissionService::new(store.clone());
        let registry = BedRegistry::new(store.clone());

        let patient_row = store
            .insert(
                tables::PATIENTS,
                json!({
                    "patient_no": "PAT/0001",
                    "first_name": "Ravi",
                    "last_name": "Nair",
                    "date_of_birth": "1985-01-20",
                    "gender": "male",
                    "phone": "555-0100",
                    "address": null,
                    "email": null,
                    "created_at": ts(1, 0),
                    "updated_at": ts(1, 0),
                }),
            )
            .await
            .unwrap();
        let patient = Uuid::parse_str(patient_row["id"].as_str().unwrap()).unwrap();

        let mut beds = Vec::new();
        for number in ["W1-01", "W1-02"] {
            let bed = registry
                .create(NewBed {
                    ward: "W1".into(),
                    bed_number: number.into(),
                })
                .await
                .unwrap();
            beds.push(bed.id);
        }

        Fixture {
            store,
            admissions,
            registry,
            patient,
            beds,
        }
    }

    fn new_admission(patient: Uuid, bed: Uuid, at: DateTime<Utc>) -> NewAdmission {
        NewAdmission {
            patient_id: patient,
            bed_id: bed,
            admitted_at: Some(at),
            panel_id: None,
            doctors: Vec::new(),
            attendant_name: None,
            attendant_phone: None,
            attendant_id_doc: None,
        }
    }

    #[tokio::test]
    async fn should_keep_the_occupancy_invariant_through_the_lifecycle() {
        let f = fixture().await;

        let admission = f
            .admissions
            .admit(new_admission(f.patient, f.beds[0], ts(2, 8)))
            .await
            .unwrap();
        f.registry.verify_occupancy().await.unwrap();

        f.admissions
            .shift_bed(admission.id, f.beds[1], Some(ts(3, 10)))
            .await
            .unwrap();
        f.registry.verify_occupancy().await.unwrap();

        f.admissions
            .discharge(admission.id, Some(ts(5, 12)), AdmissionStatus::Discharged)
            .await
            .unwrap();
        f.registry.verify_occupancy().await.unwrap();
    }

    #[tokio::test]
    async fn should_record_contiguous_history_across_shift_and_discharge() {
        let f = fixture().await;
        let admission = f
            .admissions
            .admit(new_admission(f.patient, f.beds[0], ts(2, 8)))
            .await
            .unwrap();
        f.admissions
            .shift_bed(admission.id, f.beds[1], Some(ts(3, 10)))
            .await
            .unwrap();
        f.admissions
            .discharge(admission.id, Some(ts(5, 12)), AdmissionStatus::Discharged)
            .await
            .unwrap();

        let history = f.admissions.bed_history(admission.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].entry.bed_id, f.beds[0]);
        assert_eq!(history[0].entry.to_time, Some(ts(3, 10)));
        assert_eq!(history[1].entry.from_time, ts(3, 10));
        assert_eq!(history[1].entry.to_time, Some(ts(5, 12)));

        let first = f.registry.get(f.beds[0]).await.unwrap();
        let second = f.registry.get(f.beds[1]).await.unwrap();
        assert_eq!(first.status, BedStatus::Available);
        assert_eq!(second.status, BedStatus::Available);
    }

    #[tokio::test]
    async fn should_reject_admits_into_unavailable_beds() {
        let f = fixture().await;
        f.admissions
            .admit(new_admission(f.patient, f.beds[0], ts(2, 8)))
            .await
            .unwrap();

        let second_patient = f
            .store
            .insert(
                tables::PATIENTS,
                json!({"first_name": "Mina", "last_name": "Das", "phone": "555-0101",
                       "date_of_birth": "1990-03-03", "gender": "female",
                       "patient_no": "PAT/0002", "address": null, "email": null,
                       "created_at": ts(1, 0), "updated_at": ts(1, 0)}),
            )
            .await
            .unwrap();
        let second_patient = Uuid::parse_str(second_patient["id"].as_str().unwrap()).unwrap();

        let refused = f
            .admissions
            .admit(new_admission(second_patient, f.beds[0], ts(2, 9)))
            .await;
        assert!(matches!(refused, Err(HospitalError::BedUnavailable(_))));
    }

    #[tokio::test]
    async fn should_reject_shifts_before_the_current_stay_began() {
        let f = fixture().await;
        let admission = f
            .admissions
            .admit(new_admission(f.patient, f.beds[0], ts(2, 8)))
            .await
            .unwrap();
        let refused = f
            .admissions
            .shift_bed(admission.id, f.beds[1], Some(ts(1, 0)))
            .await;
        assert!(matches!(refused, Err(HospitalError::Validation(_))));
    }

    #[tokio::test]
    async fn should_restrict_edit_to_terminal_status_corrections() {
        let f = fixture().await;
        let admission = f
            .admissions
            .admit(new_admission(f.patient, f.beds[0], ts(2, 8)))
            .await
            .unwrap();

        let refused = f
            .admissions
            .edit(
                admission.id,
                AdmissionUpdate {
                    status: Some(AdmissionStatus::Discharged),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(refused, Err(HospitalError::Validation(_))));

        f.admissions
            .discharge(admission.id, Some(ts(4, 9)), AdmissionStatus::Discharged)
            .await
            .unwrap();
        let corrected = f
            .admissions
            .edit(
                admission.id,
                AdmissionUpdate {
                    status: Some(AdmissionStatus::Lama),
                    discharged_at: Some(ts(4, 11)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(corrected.status, AdmissionStatus::Lama);
        assert_eq!(corrected.discharged_at, Some(ts(4, 11)));
    }

    #[tokio::test]
    async fn should_block_delete_of_active_admissions() {
        let f = fixture().await;
        let admission = f
            .admissions
            .admit(new_admission(f.patient, f.beds[0], ts(2, 8)))
            .await
            .unwrap();

        let refused = f.admissions.delete(admission.id).await;
        assert!(matches!(refused, Err(HospitalError::Validation(_))));

        f.admissions
            .discharge(admission.id, Some(ts(3, 8)), AdmissionStatus::Discharged)
            .await
            .unwrap();
        f.admissions.delete(admission.id).await.unwrap();
        assert!(matches!(
            f.admissions.get(admission.id).await,
            Err(HospitalError::NotFound(_))
        ));
        let orphaned = f
            .store
            .select(
                Query::table(tables::BED_HISTORY).eq("admission_id", admission.id.to_string()),
            )
            .await
            .unwrap();
        assert!(orphaned.is_empty());
    }

    #[tokio::test]
    async fn should_number_admissions_sequentially_within_a_month() {
        let f = fixture().await;
        let preview = f.admissions.next_admission_no().await.unwrap();
        assert!(preview.starts_with("IPD/"));

        let first = f
            .admissions
            .admit(new_admission(f.patient, f.beds[0], ts(2, 8)))
            .await
            .unwrap();
        assert_eq!(first.admission_no, "IPD/2402/001");

        f.admissions
            .discharge(first.id, Some(ts(3, 8)), AdmissionStatus::Discharged)
            .await
            .unwrap();
        let second = f
            .admissions
            .admit(new_admission(f.patient, f.beds[1], ts(10, 8)))
            .await
            .unwrap();
        assert_eq!(second.admission_no, "IPD/2402/002");

        f.admissions
            .discharge(second.id, Some(ts(11, 8)), AdmissionStatus::Discharged)
            .await
            .unwrap();
        let next_month = f
            .admissions
            .admit(new_admission(
                f.patient,
                f.beds[0],
                Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(next_month.admission_no, "IPD/2403/001");
    }
}
