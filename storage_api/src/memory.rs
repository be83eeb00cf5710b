// storage_api/src/memory.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex as StdMutex;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::errors::StoreError;
use crate::filter::Query;
use crate::store::{ChangeEvent, ChangeKind, RowStore};
use crate::tables;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct Inner {
    tables: HashMap<String, BTreeMap<Uuid, Value>>,
    counters: HashMap<String, u64>,
    blobs: HashMap<String, Vec<u8>>,
}

/// In-process reference implementation of the provider contract. Every
/// procedure body runs under one write lock, which is what makes the
/// multi-table lifecycle transitions atomic here the way the hosted
/// database's stored procedures make them atomic in production.
pub struct InMemoryBackend {
    inner: RwLock<Inner>,
    channels: StdMutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
    unique: HashMap<&'static str, &'static [&'static str]>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let mut inner = Inner::default();
        for table in tables::ALL {
            inner.tables.insert(table.to_string(), BTreeMap::new());
        }

        let mut unique: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        unique.insert(tables::PATIENTS, &["phone"]);
        unique.insert(tables::PANELS, &["name"]);

        InMemoryBackend {
            inner: RwLock::new(inner),
            channels: StdMutex::new(HashMap::new()),
            unique,
        }
    }

    fn sender(&self, table: &str) -> broadcast::Sender<ChangeEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    fn emit(&self, events: Vec<ChangeEvent>) {
        for event in events {
            debug!(table = %event.table, kind = ?event.kind, row = %event.row_id, "change event");
            // Nobody listening is fine.
            let _ = self.sender(&event.table).send(event);
        }
    }

    fn check_unique(
        &self,
        inner: &Inner,
        table: &str,
        row: &Value,
        skip_id: Uuid,
    ) -> Result<(), StoreError> {
        let Some(columns) = self.unique.get(table) else {
            return Ok(());
        };
        let rows = inner
            .tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        for column in *columns {
            let value = row.get(*column).cloned().unwrap_or(Value::Null);
            if value.is_null() {
                continue;
            }
            let taken = rows.iter().any(|(id, existing)| {
                *id != skip_id && existing.get(*column) == Some(&value)
            });
            if taken {
                return Err(StoreError::UniqueViolation {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    fn insert_locked(
        &self,
        inner: &mut Inner,
        table: &str,
        mut row: Value,
    ) -> Result<(Value, ChangeEvent), StoreError> {
        let obj = row
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidRow("row must be a JSON object".into()))?;
        let id = match obj.get("id") {
            Some(v) if !v.is_null() => value_uuid(v, "id")?,
            _ => {
                let id = Uuid::new_v4();
                obj.insert("id".into(), json!(id));
                id
            }
        };
        self.check_unique(inner, table, &row, id)?;
        let rows = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        rows.insert(id, row.clone());
        Ok((
            row,
            ChangeEvent {
                table: table.to_string(),
                kind: ChangeKind::Insert,
                row_id: id,
            },
        ))
    }

    fn update_locked(
        &self,
        inner: &mut Inner,
        table: &str,
        id: Uuid,
        patch: &Value,
    ) -> Result<(Value, ChangeEvent), StoreError> {
        let patch_obj = patch
            .as_object()
            .ok_or_else(|| StoreError::InvalidRow("patch must be a JSON object".into()))?;
        let mut row = {
            let rows = inner
                .tables
                .get(table)
                .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
            rows.get(&id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(table.to_string()))?
        };
        {
            let obj = row.as_object_mut().expect("stored rows are objects");
            for (key, value) in patch_obj {
                if key == "id" {
                    continue;
                }
                obj.insert(key.clone(), value.clone());
            }
        }
        self.check_unique(inner, table, &row, id)?;
        inner
            .tables
            .get_mut(table)
            .expect("checked above")
            .insert(id, row.clone());
        Ok((
            row,
            ChangeEvent {
                table: table.to_string(),
                kind: ChangeKind::Update,
                row_id: id,
            },
        ))
    }

    fn get_locked(&self, inner: &Inner, table: &str, id: Uuid) -> Result<Value, StoreError> {
        inner
            .tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(table.to_string()))
    }

    fn delete_locked(
        &self,
        inner: &mut Inner,
        table: &str,
        id: Uuid,
    ) -> Result<ChangeEvent, StoreError> {
        let rows = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        if rows.remove(&id).is_none() {
            return Err(StoreError::NotFound(table.to_string()));
        }
        Ok(ChangeEvent {
            table: table.to_string(),
            kind: ChangeKind::Delete,
            row_id: id,
        })
    }

    fn next_number_locked(&self, inner: &mut Inner, scope: &str) -> u64 {
        let counter = inner.counters.entry(scope.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    // --- procedures -------------------------------------------------------

    fn proc_admit_patient(
        &self,
        inner: &mut Inner,
        args: &Value,
    ) -> Result<(Value, Vec<ChangeEvent>), StoreError> {
        const PROC: &str = "admit_patient";
        let patient_id = arg_uuid(args, "patient_id")?;
        let bed_id = arg_uuid(args, "bed_id")?;
        let admitted_at = parse_timestamp(arg_str(args, "admitted_at")?, PROC)?;

        self.get_locked(inner, tables::PATIENTS, patient_id)?;
        if let Some(panel) = args.get("panel_id").filter(|v| !v.is_null()) {
            self.get_locked(inner, tables::PANELS, value_uuid(panel, "panel_id")?)?;
        }
        let bed = self.get_locked(inner, tables::BEDS, bed_id)?;
        if bed.get("status") != Some(&json!("available")) {
            return Err(StoreError::ProcedureFailed(
                PROC.into(),
                format!("bed {bed_id} is not available"),
            ));
        }

        let year_month = admitted_at.format("%y%m").to_string();
        let seq = self.next_number_locked(inner, &format!("ipd:{year_month}"));
        let admission_no = format!("IPD/{year_month}/{seq:03}");

        let admission_id = Uuid::new_v4();
        let now = json!(Utc::now());
        let admission = json!({
            "id": admission_id,
            "admission_no": admission_no,
            "patient_id": patient_id,
            "bed_id": bed_id,
            "status": "admitted",
            "admitted_at": admitted_at,
            "discharged_at": null,
            "doctors": args.get("doctors").cloned().unwrap_or_else(|| json!([])),
            "panel_id": args.get("panel_id").cloned().unwrap_or(Value::Null),
            "attendant_name": args.get("attendant_name").cloned().unwrap_or(Value::Null),
            "attendant_phone": args.get("attendant_phone").cloned().unwrap_or(Value::Null),
            "attendant_id_doc": args.get("attendant_id_doc").cloned().unwrap_or(Value::Null),
            "created_at": now,
            "updated_at": now,
        });

        let mut events = Vec::new();
        let (admission, event) = self.insert_locked(inner, tables::ADMISSIONS, admission)?;
        events.push(event);

        let bed_patch = json!({
            "status": "occupied",
            "current_admission": admission_id,
            "updated_at": now,
        });
        let (_, event) = self.update_locked(inner, tables::BEDS, bed_id, &bed_patch)?;
        events.push(event);

        let history = json!({
            "id": Uuid::new_v4(),
            "admission_id": admission_id,
            "bed_id": bed_id,
            "from_time": admitted_at,
            "to_time": null,
        });
        let (_, event) = self.insert_locked(inner, tables::BED_HISTORY, history)?;
        events.push(event);

        Ok((admission, events))
    }

    fn proc_shift_bed(
        &self,
        inner: &mut Inner,
        args: &Value,
    ) -> Result<(Value, Vec<ChangeEvent>), StoreError> {
        const PROC: &str = "shift_bed";
        let admission_id = arg_uuid(args, "admission_id")?;
        let old_bed_id = arg_uuid(args, "old_bed_id")?;
        let new_bed_id = arg_uuid(args, "new_bed_id")?;
        let shift_time = parse_timestamp(arg_str(args, "shift_time")?, PROC)?;

        let admission = self.get_locked(inner, tables::ADMISSIONS, admission_id)?;
        if admission.get("status") != Some(&json!("admitted")) {
            return Err(StoreError::ProcedureFailed(
                PROC.into(),
                format!("admission {admission_id} is not active"),
            ));
        }
        if admission.get("bed_id") != Some(&json!(old_bed_id)) {
            return Err(StoreError::ProcedureFailed(
                PROC.into(),
                format!("admission {admission_id} does not occupy bed {old_bed_id}"),
            ));
        }
        if new_bed_id == old_bed_id {
            return Err(StoreError::ProcedureFailed(
                PROC.into(),
                "target bed is the current bed".into(),
            ));
        }
        let new_bed = self.get_locked(inner, tables::BEDS, new_bed_id)?;
        if new_bed.get("status") != Some(&json!("available")) {
            return Err(StoreError::ProcedureFailed(
                PROC.into(),
                format!("bed {new_bed_id} is not available"),
            ));
        }

        let open_entry_id = self.open_history_entry(inner, admission_id).ok_or_else(|| {
            StoreError::ProcedureFailed(
                PROC.into(),
                format!("admission {admission_id} has no open bed-history entry"),
            )
        })?;

        let now = json!(Utc::now());
        let mut events = Vec::new();

        let close = json!({"to_time": shift_time});
        let (_, event) = self.update_locked(inner, tables::BED_HISTORY, open_entry_id, &close)?;
        events.push(event);

        let opened = json!({
            "id": Uuid::new_v4(),
            "admission_id": admission_id,
            "bed_id": new_bed_id,
            "from_time": shift_time,
            "to_time": null,
        });
        let (_, event) = self.insert_locked(inner, tables::BED_HISTORY, opened)?;
        events.push(event);

        let release = json!({"status": "available", "current_admission": null, "updated_at": now});
        let (_, event) = self.update_locked(inner, tables::BEDS, old_bed_id, &release)?;
        events.push(event);

        let occupy = json!({
            "status": "occupied",
            "current_admission": admission_id,
            "updated_at": now,
        });
        let (_, event) = self.update_locked(inner, tables::BEDS, new_bed_id, &occupy)?;
        events.push(event);

        let patch = json!({"bed_id": new_bed_id, "updated_at": now});
        let (admission, event) =
            self.update_locked(inner, tables::ADMISSIONS, admission_id, &patch)?;
        events.push(event);

        Ok((admission, events))
    }

    fn proc_discharge_admission(
        &self,
        inner: &mut Inner,
        args: &Value,
    ) -> Result<(Value, Vec<ChangeEvent>), StoreError> {
        const PROC: &str = "discharge_admission";
        let admission_id = arg_uuid(args, "admission_id")?;
        let discharged_at = parse_timestamp(arg_str(args, "discharged_at")?, PROC)?;
        let status = arg_str(args, "status")?;
        if !matches!(status, "discharged" | "lama" | "expired") {
            return Err(StoreError::ProcedureFailed(
                PROC.into(),
                format!("'{status}' is not a terminal status"),
            ));
        }

        let admission = self.get_locked(inner, tables::ADMISSIONS, admission_id)?;
        if admission.get("status") != Some(&json!("admitted")) {
            return Err(StoreError::ProcedureFailed(
                PROC.into(),
                format!("admission {admission_id} is not active"),
            ));
        }
        let admitted_at = parse_timestamp(
            admission
                .get("admitted_at")
                .and_then(Value::as_str)
                .unwrap_or_default(),
            PROC,
        )?;
        if discharged_at < admitted_at {
            return Err(StoreError::ProcedureFailed(
                PROC.into(),
                "discharge time precedes admission time".into(),
            ));
        }
        let bed_id = value_uuid(
            admission.get("bed_id").unwrap_or(&Value::Null),
            "bed_id",
        )?;

        let now = json!(Utc::now());
        let mut events = Vec::new();

        let patch = json!({
            "status": status,
            "discharged_at": discharged_at,
            "updated_at": now,
        });
        let (admission, event) =
            self.update_locked(inner, tables::ADMISSIONS, admission_id, &patch)?;
        events.push(event);

        if let Some(entry_id) = self.open_history_entry(inner, admission_id) {
            let close = json!({"to_time": discharged_at});
            let (_, event) = self.update_locked(inner, tables::BED_HISTORY, entry_id, &close)?;
            events.push(event);
        }

        let release = json!({"status": "available", "current_admission": null, "updated_at": now});
        let (_, event) = self.update_locked(inner, tables::BEDS, bed_id, &release)?;
        events.push(event);

        Ok((admission, events))
    }

    fn proc_delete_admission(
        &self,
        inner: &mut Inner,
        args: &Value,
    ) -> Result<(Value, Vec<ChangeEvent>), StoreError> {
        const PROC: &str = "delete_admission";
        let admission_id = arg_uuid(args, "admission_id")?;

        let admission = self.get_locked(inner, tables::ADMISSIONS, admission_id)?;
        if admission.get("status") == Some(&json!("admitted")) {
            return Err(StoreError::ProcedureFailed(
                PROC.into(),
                format!("admission {admission_id} is still active"),
            ));
        }

        let entry_ids: Vec<Uuid> = inner
            .tables
            .get(tables::BED_HISTORY)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, row)| row.get("admission_id") == Some(&json!(admission_id)))
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default();

        let mut events = Vec::new();
        for entry_id in entry_ids {
            events.push(self.delete_locked(inner, tables::BED_HISTORY, entry_id)?);
        }
        events.push(self.delete_locked(inner, tables::ADMISSIONS, admission_id)?);

        Ok((admission, events))
    }

    fn proc_update_patient(
        &self,
        inner: &mut Inner,
        args: &Value,
    ) -> Result<(Value, Vec<ChangeEvent>), StoreError> {
        let id = arg_uuid(args, "id")?;
        let mut patch = serde_json::Map::new();
        for field in ["first_name", "last_name", "date_of_birth", "gender", "phone", "address", "email"] {
            if let Some(value) = args.get(field) {
                patch.insert(field.to_string(), value.clone());
            }
        }
        patch.insert("updated_at".into(), json!(Utc::now()));
        let (row, event) =
            self.update_locked(inner, tables::PATIENTS, id, &Value::Object(patch))?;
        Ok((row, vec![event]))
    }

    fn open_history_entry(&self, inner: &Inner, admission_id: Uuid) -> Option<Uuid> {
        inner
            .tables
            .get(tables::BED_HISTORY)?
            .iter()
            .find(|(_, row)| {
                row.get("admission_id") == Some(&json!(admission_id))
                    && row.get("to_time").map(Value::is_null).unwrap_or(true)
            })
            .map(|(id, _)| *id)
    }
}

#[async_trait]
impl RowStore for InMemoryBackend {
    async fn select(&self, query: Query) -> Result<Vec<Value>, StoreError> {
        let inner = self.inner.read().await;
        let rows = inner
            .tables
            .get(&query.table)
            .ok_or_else(|| StoreError::UnknownTable(query.table.clone()))?;
        let mut matched: Vec<Value> = rows
            .values()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        query.sort(&mut matched);
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn select_single(&self, query: Query) -> Result<Value, StoreError> {
        let table = query.table.clone();
        let mut rows = self.select(query).await?;
        match rows.len() {
            0 => Err(StoreError::NotFound(table)),
            1 => Ok(rows.remove(0)),
            n => Err(StoreError::MultipleRows(table, n)),
        }
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let (row, event) = {
            let mut inner = self.inner.write().await;
            self.insert_locked(&mut inner, table, row)?
        };
        self.emit(vec![event]);
        Ok(row)
    }

    async fn update(&self, table: &str, id: Uuid, patch: Value) -> Result<Value, StoreError> {
        let (row, event) = {
            let mut inner = self.inner.write().await;
            self.update_locked(&mut inner, table, id, &patch)?
        };
        self.emit(vec![event]);
        Ok(row)
    }

    async fn delete(&self, table: &str, id: Uuid) -> Result<(), StoreError> {
        let event = {
            let mut inner = self.inner.write().await;
            self.delete_locked(&mut inner, table, id)?
        };
        self.emit(vec![event]);
        Ok(())
    }

    async fn rpc(&self, name: &str, args: Value) -> Result<Value, StoreError> {
        let (result, events) = {
            let mut inner = self.inner.write().await;
            match name {
                "admit_patient" => self.proc_admit_patient(&mut inner, &args)?,
                "shift_bed" => self.proc_shift_bed(&mut inner, &args)?,
                "discharge_admission" => self.proc_discharge_admission(&mut inner, &args)?,
                "delete_admission" => self.proc_delete_admission(&mut inner, &args)?,
                "update_patient" => self.proc_update_patient(&mut inner, &args)?,
                "next_number" => {
                    let scope = arg_str(&args, "scope")?;
                    let seq = self.next_number_locked(&mut inner, scope);
                    (json!({"seq": seq}), Vec::new())
                }
                "peek_number" => {
                    let scope = arg_str(&args, "scope")?;
                    let seq = inner.counters.get(scope).copied().unwrap_or(0) + 1;
                    (json!({"seq": seq}), Vec::new())
                }
                other => return Err(StoreError::UnknownProcedure(other.to_string())),
            }
        };
        self.emit(events);
        Ok(result)
    }

    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        self.sender(table).subscribe()
    }
}

#[async_trait]
impl BlobStore for InMemoryBackend {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        overwrite: bool,
    ) -> Result<String, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.blobs.contains_key(path) && !overwrite {
            return Err(StoreError::BlobExists(path.to_string()));
        }
        inner.blobs.insert(path.to_string(), bytes);
        Ok(self.public_url(path))
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.read().await;
        inner
            .blobs
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::BlobNotFound(path.to_string()))
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://storage/{path}")
    }
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, StoreError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidRow(format!("missing argument '{key}'")))
}

fn arg_uuid(args: &Value, key: &str) -> Result<Uuid, StoreError> {
    value_uuid(args.get(key).unwrap_or(&Value::Null), key)
}

fn value_uuid(value: &Value, field: &str) -> Result<Uuid, StoreError> {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| StoreError::InvalidRow(format!("'{field}' is not a UUID")))
}

fn parse_timestamp(raw: &str, proc: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::ProcedureFailed(proc.to_string(), format!("bad timestamp '{raw}': {e}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use chrono::TimeZone;

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, day, hour, 0, 0).unwrap()
    }

    async fn seed_patient(store: &InMemoryBackend, phone: &str) -> Uuid {
        let row = store
            .insert(
                tables::PATIENTS,
                json!({
                    "patient_no": "PAT/0001",
                    "first_name": "Asha",
                    "last_name": "Verma",
                    "date_of_birth": "1990-05-04",
                    "gender": "female",
                    "phone": phone,
                    "address": null,
                    "email": null,
                    "created_at": ts(1, 0),
                    "updated_at": ts(1, 0),
                }),
            )
            .await
            .unwrap();
        value_uuid(&row["id"], "id").unwrap()
    }

    async fn seed_bed(store: &InMemoryBackend, ward: &str, number: &str) -> Uuid {
        let row = store
            .insert(
                tables::BEDS,
                json!({
                    "ward": ward,
                    "bed_number": number,
                    "status": "available",
                    "current_admission": null,
                    "created_at": ts(1, 0),
                    "updated_at": ts(1, 0),
                }),
            )
            .await
            .unwrap();
        value_uuid(&row["id"], "id").unwrap()
    }

    async fn admit(store: &InMemoryBackend, patient: Uuid, bed: Uuid, at: DateTime<Utc>) -> Value {
        store
            .rpc(
                "admit_patient",
                json!({"patient_id": patient, "bed_id": bed, "admitted_at": at}),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn should_filter_order_and_limit_selects() {
        let store = InMemoryBackend::new();
        seed_bed(&store, "B", "02").await;
        seed_bed(&store, "A", "02").await;
        seed_bed(&store, "A", "01").await;

        let rows = store
            .select(
                Query::table(tables::BEDS)
                    .order_by("ward", true)
                    .order_by("bed_number", true)
                    .limit(2),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["ward"], json!("A"));
        assert_eq!(rows[0]["bed_number"], json!("01"));
        assert_eq!(rows[1]["bed_number"], json!("02"));
    }

    #[tokio::test]
    async fn should_reject_zero_or_many_rows_in_select_single() {
        let store = InMemoryBackend::new();
        seed_bed(&store, "A", "01").await;
        seed_bed(&store, "A", "02").await;

        let none = store
            .select_single(Query::table(tables::BEDS).eq("ward", "Z"))
            .await;
        assert!(matches!(none, Err(StoreError::NotFound(_))));

        let many = store
            .select_single(Query::table(tables::BEDS).eq("ward", "A"))
            .await;
        assert!(matches!(many, Err(StoreError::MultipleRows(_, 2))));
    }

    #[tokio::test]
    async fn should_enforce_unique_patient_phone() {
        let store = InMemoryBackend::new();
        seed_patient(&store, "555-0100").await;
        let dup = store
            .insert(
                tables::PATIENTS,
                json!({"first_name": "Dup", "phone": "555-0100"}),
            )
            .await;
        assert!(matches!(dup, Err(StoreError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn should_notify_subscribers_of_changes() {
        let store = InMemoryBackend::new();
        let mut rx = store.subscribe(tables::BEDS);
        let bed = seed_bed(&store, "A", "01").await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.row_id, bed);

        store.delete(tables::BEDS, bed).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
    }

    #[tokio::test]
    async fn should_admit_atomically_and_reject_occupied_beds() {
        let store = InMemoryBackend::new();
        let patient = seed_patient(&store, "555-0100").await;
        let other = seed_patient(&store, "555-0101").await;
        let bed = seed_bed(&store, "General", "G-01").await;

        let admission = admit(&store, patient, bed, ts(2, 8)).await;
        assert_eq!(admission["status"], json!("admitted"));
        assert_eq!(admission["admission_no"], json!("IPD/2402/001"));

        let bed_row = store
            .select_single(Query::table(tables::BEDS).eq("id", bed.to_string()))
            .await
            .unwrap();
        assert_eq!(bed_row["status"], json!("occupied"));
        assert_eq!(bed_row["current_admission"], admission["id"]);

        let history = store
            .select(Query::table(tables::BED_HISTORY).eq("admission_id", admission["id"].clone()))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0]["to_time"].is_null());

        let refused = store
            .rpc(
                "admit_patient",
                json!({"patient_id": other, "bed_id": bed, "admitted_at": ts(2, 9)}),
            )
            .await;
        assert!(matches!(refused, Err(StoreError::ProcedureFailed(_, _))));
    }

    #[tokio::test]
    async fn should_shift_bed_as_one_unit() {
        let store = InMemoryBackend::new();
        let patient = seed_patient(&store, "555-0100").await;
        let first = seed_bed(&store, "General", "G-01").await;
        let second = seed_bed(&store, "General", "G-02").await;

        let admission = admit(&store, patient, first, ts(2, 8)).await;
        let admission_id = admission["id"].as_str().unwrap().to_string();

        let shifted = store
            .rpc(
                "shift_bed",
                json!({
                    "admission_id": admission_id,
                    "old_bed_id": first,
                    "new_bed_id": second,
                    "shift_time": ts(3, 10),
                }),
            )
            .await
            .unwrap();
        assert_eq!(shifted["bed_id"], json!(second));

        let old_bed = store
            .select_single(Query::table(tables::BEDS).eq("id", first.to_string()))
            .await
            .unwrap();
        assert_eq!(old_bed["status"], json!("available"));
        assert!(old_bed["current_admission"].is_null());

        let new_bed = store
            .select_single(Query::table(tables::BEDS).eq("id", second.to_string()))
            .await
            .unwrap();
        assert_eq!(new_bed["status"], json!("occupied"));

        let history = store
            .select(
                Query::table(tables::BED_HISTORY)
                    .eq("admission_id", admission_id.clone())
                    .order_by("from_time", true),
            )
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["to_time"], history[1]["from_time"]);
        assert!(history[1]["to_time"].is_null());
    }

    #[tokio::test]
    async fn should_refuse_shift_into_the_current_bed() {
        let store = InMemoryBackend::new();
        let patient = seed_patient(&store, "555-0100").await;
        let bed = seed_bed(&store, "General", "G-01").await;
        let admission = admit(&store, patient, bed, ts(2, 8)).await;

        let refused = store
            .rpc(
                "shift_bed",
                json!({
                    "admission_id": admission["id"],
                    "old_bed_id": bed,
                    "new_bed_id": bed,
                    "shift_time": ts(2, 9),
                }),
            )
            .await;
        assert!(matches!(refused, Err(StoreError::ProcedureFailed(_, _))));
    }

    #[tokio::test]
    async fn should_discharge_and_free_the_bed_as_one_unit() {
        let store = InMemoryBackend::new();
        let patient = seed_patient(&store, "555-0100").await;
        let bed = seed_bed(&store, "General", "G-01").await;
        let admission = admit(&store, patient, bed, ts(2, 8)).await;

        let before_admit = store
            .rpc(
                "discharge_admission",
                json!({
                    "admission_id": admission["id"],
                    "discharged_at": ts(1, 0),
                    "status": "discharged",
                }),
            )
            .await;
        assert!(matches!(before_admit, Err(StoreError::ProcedureFailed(_, _))));

        let discharged = store
            .rpc(
                "discharge_admission",
                json!({
                    "admission_id": admission["id"],
                    "discharged_at": ts(5, 12),
                    "status": "lama",
                }),
            )
            .await
            .unwrap();
        assert_eq!(discharged["status"], json!("lama"));
        assert_eq!(discharged["discharged_at"], json!(ts(5, 12)));

        let bed_row = store
            .select_single(Query::table(tables::BEDS).eq("id", bed.to_string()))
            .await
            .unwrap();
        assert_eq!(bed_row["status"], json!("available"));

        let history = store
            .select(Query::table(tables::BED_HISTORY).eq("admission_id", admission["id"].clone()))
            .await
            .unwrap();
        assert!(history.iter().all(|entry| !entry["to_time"].is_null()));

        let again = store
            .rpc(
                "discharge_admission",
                json!({
                    "admission_id": admission["id"],
                    "discharged_at": ts(6, 0),
                    "status": "discharged",
                }),
            )
            .await;
        assert!(matches!(again, Err(StoreError::ProcedureFailed(_, _))));
    }

    #[tokio::test]
    async fn should_delete_admission_and_history_as_one_unit() {
        let store = InMemoryBackend::new();
        let patient = seed_patient(&store, "555-0100").await;
        let first = seed_bed(&store, "General", "G-01").await;
        let second = seed_bed(&store, "General", "G-02").await;
        let admission = admit(&store, patient, first, ts(2, 8)).await;

        let active = store
            .rpc("delete_admission", json!({"admission_id": admission["id"]}))
            .await;
        assert!(matches!(active, Err(StoreError::ProcedureFailed(_, _))));

        store
            .rpc(
                "shift_bed",
                json!({
                    "admission_id": admission["id"],
                    "old_bed_id": first,
                    "new_bed_id": second,
                    "shift_time": ts(3, 10),
                }),
            )
            .await
            .unwrap();
        store
            .rpc(
                "discharge_admission",
                json!({
                    "admission_id": admission["id"],
                    "discharged_at": ts(5, 12),
                    "status": "discharged",
                }),
            )
            .await
            .unwrap();

        store
            .rpc("delete_admission", json!({"admission_id": admission["id"]}))
            .await
            .unwrap();

        let admissions = store.select(Query::table(tables::ADMISSIONS)).await.unwrap();
        assert!(admissions.is_empty());
        let history = store
            .select(Query::table(tables::BED_HISTORY).eq("admission_id", admission["id"].clone()))
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn should_scope_number_sequences_and_support_peek() {
        let store = InMemoryBackend::new();
        let peek = store.rpc("peek_number", json!({"scope": "ipd:2402"})).await.unwrap();
        assert_eq!(peek["seq"], json!(1));

        let first = store.rpc("next_number", json!({"scope": "ipd:2402"})).await.unwrap();
        let second = store.rpc("next_number", json!({"scope": "ipd:2402"})).await.unwrap();
        let other_month = store.rpc("next_number", json!({"scope": "ipd:2403"})).await.unwrap();
        assert_eq!(first["seq"], json!(1));
        assert_eq!(second["seq"], json!(2));
        assert_eq!(other_month["seq"], json!(1));

        let peek = store.rpc("peek_number", json!({"scope": "ipd:2402"})).await.unwrap();
        assert_eq!(peek["seq"], json!(3));
    }

    #[tokio::test]
    async fn should_update_patient_through_the_procedure() {
        let store = InMemoryBackend::new();
        let id = seed_patient(&store, "555-0100").await;
        let row = store
            .rpc(
                "update_patient",
                json!({"id": id, "first_name": "Aisha", "phone": "555-0199"}),
            )
            .await
            .unwrap();
        assert_eq!(row["first_name"], json!("Aisha"));
        assert_eq!(row["phone"], json!("555-0199"));
        assert_eq!(row["last_name"], json!("Verma"));
    }

    #[tokio::test]
    async fn should_store_and_serve_blobs() {
        let store = InMemoryBackend::new();
        let url = store
            .upload("p1/contract/1_terms.pdf", b"pdf".to_vec(), false)
            .await
            .unwrap();
        assert_eq!(url, "memory://storage/p1/contract/1_terms.pdf");

        let clash = store.upload("p1/contract/1_terms.pdf", b"x".to_vec(), false).await;
        assert!(matches!(clash, Err(StoreError::BlobExists(_))));

        store
            .upload("p1/contract/1_terms.pdf", b"v2".to_vec(), true)
            .await
            .unwrap();
        assert_eq!(store.download("p1/contract/1_terms.pdf").await.unwrap(), b"v2");
    }
}
