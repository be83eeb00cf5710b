// ipd/src/panels.rs

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use models::{HospitalError, Panel, PanelDocumentType};
use storage_api::{document_path, tables, BlobStore, Query, RowStore};

#[derive(Debug, Deserialize)]
pub struct NewPanel {
    pub name: String,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub portal_url: Option<String>,
    pub portal_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PanelUpdate {
    pub name: Option<String>,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub portal_url: Option<String>,
    pub portal_notes: Option<String>,
}

pub struct PanelService {
    store: Arc<dyn RowStore>,
    blobs: Arc<dyn BlobStore>,
}

impl PanelService {
    pub fn new(store: Arc<dyn RowStore>, blobs: Arc<dyn BlobStore>) -> Self {
        PanelService { store, blobs }
    }

    pub async fn get(&self, id: Uuid) -> Result<Panel, HospitalError> {
        let row = self
            .store
            .select_single(Query::table(tables::PANELS).eq("id", id.to_string()))
            .await
            .map_err(|_| HospitalError::NotFound(format!("panel {id}")))?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn list(&self) -> Result<Vec<Panel>, HospitalError> {
        let rows = self
            .store
            .select(Query::table(tables::PANELS).order_by("name", true))
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(HospitalError::from))
            .collect()
    }

    pub async fn create(&self, new: NewPanel) -> Result<Panel, HospitalError> {
        if new.name.trim().is_empty() {
            return Err(HospitalError::validation("panel name is required"));
        }
        let now = Utc::now();
        let row = json!({
            "name": new.name.trim(),
            "contact_person": new.contact_person,
            "contact_phone": new.contact_phone,
            "contact_email": new.contact_email,
            "portal_url": new.portal_url,
            "portal_notes": new.portal_notes,
            "contract_doc": null,
            "rate_list_doc": null,
            "created_at": now,
            "updated_at": now,
        });
        let stored = self.store.insert(tables::PANELS, row).await?;
        Ok(serde_json::from_value(stored)?)
    }

    pub async fn update(&self, id: Uuid, update: PanelUpdate) -> Result<Panel, HospitalError> {
        self.get(id).await?;
        let mut patch = serde_json::Map::new();
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(HospitalError::validation("panel name is required"));
            }
            patch.insert("name".into(), json!(name.trim()));
        }
        if let Some(v) = update.contact_person {
            patch.insert("contact_person".into(), json!(v));
        }
        if let Some(v) = update.contact_phone {
            patch.insert("contact_phone".into(), json!(v));
        }
        if let Some(v) = update.contact_email {
            patch.insert("contact_email".into(), json!(v));
        }
        if let Some(v) = update.portal_url {
            patch.insert("portal_url".into(), json!(v));
        }
        if let Some(v) = update.portal_notes {
            patch.insert("portal_notes".into(), json!(v));
        }
        patch.insert("updated_at".into(), json!(Utc::now()));
        let row = self
            .store
            .update(tables::PANELS, id, serde_json::Value::Object(patch))
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), HospitalError> {
        self.get(id).await?;
        self.store.delete(tables::PANELS, id).await?;
        Ok(())
    }

    /// Stores a contract or rate-list document under
    /// `<panel_id>/<document_type>/<timestamp>_<sanitized_filename>`,
    /// records the path on the panel row and returns the public URL.
    /// Re-uploading replaces the previous document of that type.
    pub async fn upload_document(
        &self,
        id: Uuid,
        doc_type: PanelDocumentType,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<String, HospitalError> {
        if bytes.is_empty() {
            return Err(HospitalError::validation("document is empty"));
        }
        self.get(id).await?;
        let path = document_path(id, &doc_type.to_string(), filename, Utc::now());
        let url = self.blobs.upload(&path, bytes, true).await?;
        let column = doc_column(doc_type);
        let patch = json!({ column: path, "updated_at": Utc::now() });
        self.store.update(tables::PANELS, id, patch).await?;
        info!(panel = %id, doc_type = %doc_type, "panel document uploaded");
        Ok(url)
    }

    /// Public URL of the stored document of the given type, 404 when the
    /// panel has none.
    pub async fn document_url(
        &self,
        id: Uuid,
        doc_type: PanelDocumentType,
    ) -> Result<String, HospitalError> {
        let panel = self.get(id).await?;
        let path = match doc_type {
            PanelDocumentType::Contract => panel.contract_doc,
            PanelDocumentType::RateList => panel.rate_list_doc,
        };
        let path = path.ok_or_else(|| {
            HospitalError::NotFound(format!("{doc_type} document for panel {}", panel.name))
        })?;
        Ok(self.blobs.public_url(&path))
    }
}

fn doc_column(doc_type: PanelDocumentType) -> &'static str {
    match doc_type {
        PanelDocumentType::Contract => "contract_doc",
        PanelDocumentType::RateList => "rate_list_doc",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage_api::InMemoryBackend;

    fn service() -> PanelService {
        let backend = Arc::new(InMemoryBackend::new());
        PanelService::new(backend.clone(), backend)
    }

    fn new_panel(name: &str) -> NewPanel {
        NewPanel {
            name: name.into(),
            contact_person: None,
            contact_phone: None,
            contact_email: None,
            portal_url: None,
            portal_notes: None,
        }
    }

    #[tokio::test]
    async fn should_enforce_unique_panel_names() {
        let service = service();
        service.create(new_panel("MediAssist")).await.unwrap();
        let dup = service.create(new_panel("MediAssist")).await;
        assert!(matches!(dup, Err(HospitalError::Duplicate(_))));
    }

    #[tokio::test]
    async fn should_upload_and_serve_rate_list_documents() {
        let service = service();
        let panel = service.create(new_panel("MediAssist")).await.unwrap();

        let missing = service
            .document_url(panel.id, PanelDocumentType::RateList)
            .await;
        assert!(matches!(missing, Err(HospitalError::NotFound(_))));

        let url = service
            .upload_document(
                panel.id,
                PanelDocumentType::RateList,
                "rates 2024.pdf",
                b"pdf-bytes".to_vec(),
            )
            .await
            .unwrap();
        assert!(url.contains("/rate_list/"));
        assert!(url.ends_with("rates_2024.pdf"));

        let served = service
            .document_url(panel.id, PanelDocumentType::RateList)
            .await
            .unwrap();
        assert_eq!(served, url);

        let stored = service.get(panel.id).await.unwrap();
        assert!(stored.rate_list_doc.is_some());
        assert!(stored.contract_doc.is_none());
    }
}
