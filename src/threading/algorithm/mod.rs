//! Email threading algorithm implementation
//!
//! This module implements the JWZ (Jamie Zawinski) threading algorithm
//! for organizing email messages into conversation threads.
//!
//! ## Main Entry Point
//!
//! Use [`crate::threading::Threader`] or [`crate::threading::build_threads`];
//! this module only produces the intermediate flat forest.

mod cycle_detection;
mod jwz_threading;
pub mod tree_traversal;

pub(crate) use jwz_threading::build_email_threads;
pub use tree_traversal::{Visit, collect_keys, preorder};
