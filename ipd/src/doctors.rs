// ipd/src/doctors.rs

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use models::{Doctor, HospitalError};
use storage_api::{tables, Query, RowStore};

#[derive(Debug, Deserialize)]
pub struct NewDoctor {
    pub name: String,
    pub specialty: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DoctorUpdate {
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub phone: Option<String>,
}

pub struct DoctorService {
    store: Arc<dyn RowStore>,
}

impl DoctorService {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        DoctorService { store }
    }

    pub async fn get(&self, id: Uuid) -> Result<Doctor, HospitalError> {
        let row = self
            .store
            .select_single(Query::table(tables::DOCTORS).eq("id", id.to_string()))
            .await
            .map_err(|_| HospitalError::NotFound(format!("doctor {id}")))?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn list(&self) -> Result<Vec<Doctor>, HospitalError> {
        let rows = self
            .store
            .select(Query::table(tables::DOCTORS).order_by("name", true))
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(HospitalError::from))
            .collect()
    }

    pub async fn create(&self, new: NewDoctor) -> Result<Doctor, HospitalError> {
        if new.name.trim().is_empty() {
            return Err(HospitalError::validation("doctor name is required"));
        }
        let now = Utc::now();
        let row = json!({
            "name": new.name.trim(),
            "specialty": new.specialty,
            "phone": new.phone,
            "created_at": now,
            "updated_at": now,
        });
        let stored = self.store.insert(tables::DOCTORS, row).await?;
        Ok(serde_json::from_value(stored)?)
    }

    pub async fn update(&self, id: Uuid, update: DoctorUpdate) -> Result<Doctor, HospitalError> {
        self.get(id).await?;
        let mut patch = serde_json::Map::new();
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(HospitalError::validation("doctor name is required"));
            }
            patch.insert("name".into(), json!(name.trim()));
        }
        if let Some(v) = update.specialty {
            patch.insert("specialty".into(), json!(v));
        }
        if let Some(v) = update.phone {
            patch.insert("phone".into(), json!(v));
        }
        patch.insert("updated_at".into(), json!(Utc::now()));
        let row = self
            .store
            .update(tables::DOCTORS, id, serde_json::Value::Object(patch))
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), HospitalError> {
        self.get(id).await?;
        self.store.delete(tables::DOCTORS, id).await?;
        Ok(())
    }
}
