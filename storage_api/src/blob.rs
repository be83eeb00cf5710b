// storage_api/src/blob.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::StoreError;

/// Path-addressed blob storage with public-URL retrieval.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` at `path`. Fails with `BlobExists` when the path is
    /// taken and `overwrite` is false. Returns the public URL.
    async fn upload(&self, path: &str, bytes: Vec<u8>, overwrite: bool)
        -> Result<String, StoreError>;

    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    fn public_url(&self, path: &str) -> String;
}

/// Builds the canonical document path,
/// `<entity_id>/<document_type>/<timestamp>_<sanitized_filename>`.
pub fn document_path(
    entity_id: Uuid,
    document_type: &str,
    filename: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}/{}/{}_{}",
        entity_id,
        document_type,
        at.timestamp(),
        sanitize_filename(filename)
    )
}

/// Replaces everything outside `[A-Za-z0-9._-]` with `_` so uploaded names
/// cannot escape or break the path scheme.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
