//! Email threading module
//!
//! This module implements the JWZ (Jamie Zawinski) threading algorithm for organizing
//! email messages into conversation threads, plus two layers of durable user intent
//! applied on top of the algorithmic result. The implementation is based on the
//! algorithm from https://www.jwz.org/doc/threading.html.
//!
//! ## Threading Strategy
//!
//! 1. **References Header**: The primary method - the full chain of message IDs
//!    builds parent-child relationships
//! 2. **In-Reply-To Header**: Fallback for messages without References
//! 3. **Subject**: Root singletons with the same normalized subject are merged
//!
//! Every call is a full recomputation over the complete message list; nothing
//! is cached between calls.
//!
//! ## Module Structure
//!
//! - `identity`: Message-ID normalization, message keys and thread ids
//! - `container`: Arena containers used while linking
//! - `algorithm`: Core JWZ implementation and traversal helpers
//! - `subject_matching`: Subject normalization and stray-root grouping
//! - `aggregation`: Per-thread summaries
//! - `jwz_algorithm`: The [`Threader`] entry point
//! - `overrides`: Per-message manual overrides
//! - `groups`: Manual thread groups and conflict reconciliation

pub mod aggregation;
pub mod algorithm;
pub mod container;
mod forest;
pub mod groups;
pub mod identity;
pub mod jwz_algorithm;
pub mod overrides;
pub mod subject_matching;

// Re-export main types and functions
pub use aggregation::summarize;
pub use groups::{apply_groups, reconcile_groups};
pub use identity::{NormalizedId, normalize, thread_identifier, thread_key};
pub use jwz_algorithm::{Threader, build_threads};
pub use overrides::apply_overrides;
pub use subject_matching::SubjectNormalizer;
