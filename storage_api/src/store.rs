// storage_api/src/store.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::filter::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Fired on every committed insert/update/delete of a table. Consumers use
/// it for cache invalidation only; it carries no row payload.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub row_id: Uuid,
}

/// Row-level access to the hosted database. Rows cross this boundary as
/// JSON objects keyed by column name; typed models (de)serialize at the
/// service layer.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, query: Query) -> Result<Vec<Value>, StoreError>;

    /// Like `select`, but errors unless exactly one row matches.
    async fn select_single(&self, query: Query) -> Result<Value, StoreError>;

    /// Inserts a row object. A missing `id` column is assigned server-side;
    /// the stored row is returned.
    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError>;

    /// Shallow-merges `patch` into the row with the given id and returns
    /// the updated row.
    async fn update(&self, table: &str, id: Uuid, patch: Value) -> Result<Value, StoreError>;

    async fn delete(&self, table: &str, id: Uuid) -> Result<(), StoreError>;

    /// Invokes a named server-side procedure. Multi-table lifecycle
    /// transitions (`admit_patient`, `shift_bed`, `discharge_admission`)
    /// commit as one unit here or not at all.
    async fn rpc(&self, name: &str, args: Value) -> Result<Value, StoreError>;

    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent>;
}
