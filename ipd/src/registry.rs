// ipd/src/registry.rs

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use models::{Admission, AdmissionStatus, Bed, BedStatus, HospitalError};
use storage_api::{tables, Query, RowStore};

#[derive(Debug, Deserialize)]
pub struct NewBed {
    pub ward: String,
    pub bed_number: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BedUpdate {
    pub ward: Option<String>,
    pub bed_number: Option<String>,
    /// Only Available <-> Maintenance; Occupied is owned by the admission
    /// lifecycle and cannot be set here.
    pub status: Option<BedStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BedCounts {
    pub total: usize,
    pub available: usize,
    pub occupied: usize,
    pub maintenance: usize,
}

/// Read-mostly view of beds and wards. Status transitions to and from
/// Occupied happen only through the admission lifecycle.
pub struct BedRegistry {
    store: Arc<dyn RowStore>,
}

impl BedRegistry {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        BedRegistry { store }
    }

    /// All beds ordered by ward, then bed number.
    pub async fn list(&self) -> Result<Vec<Bed>, HospitalError> {
        let rows = self
            .store
            .select(
                Query::table(tables::BEDS)
                    .order_by("ward", true)
                    .order_by("bed_number", true),
            )
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(HospitalError::from))
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> Result<Bed, HospitalError> {
        let row = self
            .store
            .select_single(Query::table(tables::BEDS).eq("id", id.to_string()))
            .await
            .map_err(|_| HospitalError::NotFound(format!("bed {id}")))?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn create(&self, new: NewBed) -> Result<Bed, HospitalError> {
        if new.ward.trim().is_empty() || new.bed_number.trim().is_empty() {
            return Err(HospitalError::validation("ward and bed number are required"));
        }
        let bed = Bed::new(new.ward.trim(), new.bed_number.trim());
        let row = self
            .store
            .insert(tables::BEDS, serde_json::to_value(&bed)?)
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn update(&self, id: Uuid, update: BedUpdate) -> Result<Bed, HospitalError> {
        let bed = self.get(id).await?;
        if let Some(status) = update.status {
            if status == BedStatus::Occupied || bed.status == BedStatus::Occupied {
                return Err(HospitalError::validation(
                    "occupied status is managed by the admission lifecycle",
                ));
            }
        }
        let mut patch = serde_json::Map::new();
        if let Some(ward) = update.ward {
            patch.insert("ward".into(), json!(ward.trim()));
        }
        if let Some(number) = update.bed_number {
            patch.insert("bed_number".into(), json!(number.trim()));
        }
        if let Some(status) = update.status {
            patch.insert("status".into(), json!(status));
        }
        patch.insert("updated_at".into(), json!(Utc::now()));
        let row = self
            .store
            .update(tables::BEDS, id, serde_json::Value::Object(patch))
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), HospitalError> {
        let bed = self.get(id).await?;
        if bed.status == BedStatus::Occupied {
            return Err(HospitalError::validation(format!(
                "bed {}-{} is occupied and cannot be deleted",
                bed.ward, bed.bed_number
            )));
        }
        self.store.delete(tables::BEDS, id).await?;
        Ok(())
    }

    /// Aggregate counts. Occupied is counted directly as beds referenced by
    /// an active admission, never derived as total minus available, so beds
    /// in maintenance cannot skew the figure.
    pub async fn counts(&self) -> Result<BedCounts, HospitalError> {
        let beds = self.list().await?;
        let occupied_ids = self.actively_occupied_bed_ids().await?;
        let mut counts = BedCounts {
            total: beds.len(),
            available: 0,
            occupied: 0,
            maintenance: 0,
        };
        for bed in &beds {
            if occupied_ids.contains(&bed.id) {
                counts.occupied += 1;
            } else if bed.status == BedStatus::Maintenance {
                counts.maintenance += 1;
            } else {
                counts.available += 1;
            }
        }
        Ok(counts)
    }

    /// De-duplicated, sorted names of wards with at least one available bed.
    pub async fn available_wards(&self) -> Result<Vec<String>, HospitalError> {
        let beds = self.list().await?;
        let mut wards: Vec<String> = beds
            .into_iter()
            .filter(|bed| bed.status == BedStatus::Available)
            .map(|bed| bed.ward)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        wards.sort();
        Ok(wards)
    }

    /// Cross-checks bed statuses against active admissions and reports the
    /// first drift found.
    pub async fn verify_occupancy(&self) -> Result<(), HospitalError> {
        let beds = self.list().await?;
        let occupied_ids = self.actively_occupied_bed_ids().await?;
        for bed in &beds {
            let referenced = occupied_ids.contains(&bed.id);
            let marked = bed.status == BedStatus::Occupied;
            if referenced != marked || marked != bed.current_admission.is_some() {
                warn!(bed = %bed.id, ward = %bed.ward, "occupancy drift detected");
                return Err(HospitalError::validation(format!(
                    "occupancy drift on bed {}-{}: status {}, referenced by active admission: {}",
                    bed.ward, bed.bed_number, bed.status, referenced
                )));
            }
        }
        Ok(())
    }

    async fn actively_occupied_bed_ids(&self) -> Result<HashSet<Uuid>, HospitalError> {
        let rows = self
            .store
            .select(
                Query::table(tables::ADMISSIONS)
                    .eq("status", json!(AdmissionStatus::Admitted)),
            )
            .await?;
        let mut ids = HashSet::new();
        for row in rows {
            let admission: Admission = serde_json::from_value(row)?;
            ids.insert(admission.bed_id);
        }
        Ok(ids)
    }
}
