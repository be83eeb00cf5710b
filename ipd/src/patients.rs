// ipd/src/patients.rs

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use models::{HospitalError, Patient};
use storage_api::{tables, Query, RowStore};

use crate::numbering;

#[derive(Debug, Deserialize)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub phone: String,
    pub address: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PatientUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
}

pub struct PatientService {
    store: Arc<dyn RowStore>,
}

impl PatientService {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        PatientService { store }
    }

    pub async fn get(&self, id: Uuid) -> Result<Patient, HospitalError> {
        let row = self
            .store
            .select_single(Query::table(tables::PATIENTS).eq("id", id.to_string()))
            .await
            .map_err(|_| HospitalError::NotFound(format!("patient {id}")))?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn list(&self) -> Result<Vec<Patient>, HospitalError> {
        let rows = self
            .store
            .select(Query::table(tables::PATIENTS).order_by("patient_no", true))
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(HospitalError::from))
            .collect()
    }

    pub async fn create(&self, new: NewPatient) -> Result<Patient, HospitalError> {
        if new.first_name.trim().is_empty() || new.last_name.trim().is_empty() {
            return Err(HospitalError::validation("patient name is required"));
        }
        if new.phone.trim().is_empty() {
            return Err(HospitalError::validation("patient phone is required"));
        }
        let patient_no = numbering::next_patient_no(self.store.as_ref()).await?;
        let now = Utc::now();
        let row = json!({
            "patient_no": patient_no,
            "first_name": new.first_name.trim(),
            "last_name": new.last_name.trim(),
            "date_of_birth": new.date_of_birth,
            "gender": new.gender,
            "phone": new.phone.trim(),
            "address": new.address,
            "email": new.email,
            "created_at": now,
            "updated_at": now,
        });
        let stored = self.store.insert(tables::PATIENTS, row).await?;
        let patient: Patient = serde_json::from_value(stored)?;
        info!(patient = %patient.patient_no, "patient registered");
        Ok(patient)
    }

    /// Updates go through the `update_patient` procedure; the provider's
    /// schema cache serves stale column sets on direct row updates.
    pub async fn update(&self, id: Uuid, update: PatientUpdate) -> Result<Patient, HospitalError> {
        self.get(id).await?;
        let mut args = serde_json::Map::new();
        args.insert("id".into(), json!(id));
        if let Some(v) = update.first_name {
            args.insert("first_name".into(), json!(v));
        }
        if let Some(v) = update.last_name {
            args.insert("last_name".into(), json!(v));
        }
        if let Some(v) = update.date_of_birth {
            args.insert("date_of_birth".into(), json!(v));
        }
        if let Some(v) = update.gender {
            args.insert("gender".into(), json!(v));
        }
        if let Some(v) = update.phone {
            args.insert("phone".into(), json!(v));
        }
        if let Some(v) = update.address {
            args.insert("address".into(), json!(v));
        }
        if let Some(v) = update.email {
            args.insert("email".into(), json!(v));
        }
        let row = self
            .store
            .rpc("update_patient", serde_json::Value::Object(args))
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Deletion is blocked while any admission, active or historical,
    /// references the patient.
    pub async fn delete(&self, id: Uuid) -> Result<(), HospitalError> {
        let patient = self.get(id).await?;
        let referencing = self
            .store
            .select(
                Query::table(tables::ADMISSIONS)
                    .eq("patient_id", id.to_string())
                    .limit(1),
            )
            .await?;
        if !referencing.is_empty() {
            return Err(HospitalError::validation(format!(
                "patient {} has admissions and cannot be deleted",
                patient.patient_no
            )));
        }
        self.store.delete(tables::PATIENTS, id).await?;
        Ok(())
    }
}
