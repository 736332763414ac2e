//! Embedding store for the assessment catalog, persisted with LanceDB.
//!
//! - `store`: in-memory exact cosine search over one vector per item
//! - `table`: snapshot read/write (items + meta tables)
//! - `manager`: load-or-build lifecycle and status
//! - `active`: versioned snapshots and the `CURRENT` pointer
//! - `lock`: build lock shared by concurrent builders

pub mod active;
pub mod lock;
pub mod manager;
pub mod schema;
pub mod store;
pub mod table;

pub use manager::{IndexManager, IndexStatus};
pub use store::{catalog_fingerprint, content_hash, EmbeddingStore, StoreMeta};
