//! Front door of the threading pipeline
//!
//! Runs the JWZ algorithm (see [`super::algorithm`]) and assembles the
//! resulting forest into a [`ThreadingResult`] with stable thread ids.
//!
//! ## Algorithm Steps
//!
//! 1. Create all containers (real and placeholder)
//! 2. Link parents from References / In-Reply-To, refusing cycles
//! 3. Find the root set and prune placeholders
//! 4. Group stray roots by subject (when enabled)
//! 5. Summarize every tree and derive its thread id from the root key

use std::time::Instant;

use crate::config::ThreadingConfig;
use crate::models::{MessageRecord, ThreadingResult};

use super::algorithm::build_email_threads;
use super::identity::thread_identifier;
use super::subject_matching::SubjectNormalizer;

/// Threading engine configured with a subject policy.
///
/// Holds no state between calls; every [`Threader::build`] is a full,
/// independent recomputation.
#[derive(Debug, Clone)]
pub struct Threader {
    config: ThreadingConfig,
    subjects: SubjectNormalizer,
}

impl Threader {
    pub fn new(config: ThreadingConfig) -> Self {
        let subjects = SubjectNormalizer::new(&config.reply_markers, config.strip_subject_tags);
        Threader { config, subjects }
    }

    pub fn config(&self) -> &ThreadingConfig {
        &self.config
    }

    /// Build email threads using the JWZ algorithm
    ///
    /// Never fails: malformed references are skipped and an empty input
    /// produces an empty result. Output is independent of input order.
    pub fn build(&self, messages: &[MessageRecord]) -> ThreadingResult {
        if messages.is_empty() {
            return ThreadingResult::default();
        }

        let start_time = Instant::now();
        let subjects = self.config.group_by_subject.then_some(&self.subjects);
        let assembled = build_email_threads(messages, subjects).assemble(thread_identifier);

        log::debug!(
            "threaded {} messages into {} threads in {:?}",
            messages.len(),
            assembled.threads.len(),
            start_time.elapsed()
        );

        ThreadingResult {
            roots: assembled.roots,
            threads: assembled.threads,
            algorithmic_thread_ids: assembled.membership.clone(),
            effective_thread_ids: assembled.membership,
            ..Default::default()
        }
    }
}

impl Default for Threader {
    fn default() -> Self {
        Threader::new(ThreadingConfig::default())
    }
}

/// Thread `messages` with the default policy.
pub fn build_threads(messages: &[MessageRecord]) -> ThreadingResult {
    Threader::default().build(messages)
}
