// ============================================================================
// RustFileDB Library
// ============================================================================

//! Embedded, file-backed object store.
//!
//! Every record type lives in its own table: a JSON file on disk plus an
//! in-memory cache that is loaded on first access and dropped again after a
//! configurable number of idle ticks. All table access goes through one gate,
//! and every upserted record is mirrored into a shared archive file.

pub mod config;
pub mod core;
pub mod storage;
pub mod store;
mod macros;

// Re-export main types for convenience
pub use config::{StoreConfig, TableSetting};
pub use core::{DbError, Record, RecordMeta, Result};
pub use storage::{IdleTimer, TimerFlow};
pub use store::Store;
