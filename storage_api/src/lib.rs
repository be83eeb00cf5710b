// storage_api/src/lib.rs
//
// Client contract for the hosted persistence/storage provider: row-level
// CRUD with filter composition, named atomic procedures, blob storage and
// per-table change notifications. `InMemoryBackend` is the in-process
// reference implementation used by the services and the test suite; the
// atomic procedures it carries stand in for the provider's stored
// procedures.

pub mod blob;
pub mod errors;
pub mod filter;
pub mod memory;
pub mod store;
pub mod tables;

pub use blob::{document_path, sanitize_filename, BlobStore};
pub use errors::StoreError;
pub use filter::{Filter, Order, Query};
pub use memory::InMemoryBackend;
pub use store::{ChangeEvent, ChangeKind, RowStore};
