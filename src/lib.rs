//! Conversation threading for mail archives.
//!
//! [`threading`] turns a flat list of [`MessageRecord`]s into a
//! deterministic forest of conversations using JWZ reference linking, then
//! layers manual corrections on top: per-message overrides and
//! [`ManualThreadGroup`]s. [`ingest`] and [`store`] are the supporting
//! pieces used by the `mail-threader` binary.

pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod store;
pub mod threading;

pub use config::ThreadingConfig;
pub use error::{Error, Result};
pub use models::{
    EmailThread, ManualThreadGroup, MessageKey, MessageRecord, ThreadId, ThreadNode,
    ThreadingResult,
};
pub use store::{Snapshot, SnapshotStore, StoreError};
pub use threading::{Threader, apply_groups, apply_overrides, build_threads, reconcile_groups};
