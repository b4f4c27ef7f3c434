//! JSON snapshot store
//!
//! The engine treats persisted state as an immutable snapshot per call. This
//! module is the reference store used by the command line tool: one JSON
//! file holding the message list, the override map and the group
//! definitions. It also owns the bookkeeping the engine asks its store to
//! do: applying group corrections, pruning dead overrides, and converting
//! legacy single-message overrides into groups.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ManualThreadGroup, MessageKey, MessageRecord, ThreadId};

/// Errors raised while reading or writing a snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid snapshot {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Everything the engine needs for one recomputation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
    /// Legacy per-message overrides: message key to target thread id.
    #[serde(default)]
    pub overrides: BTreeMap<MessageKey, ThreadId>,
    #[serde(default)]
    pub groups: Vec<ManualThreadGroup>,
}

impl Snapshot {
    /// Upsert messages by record id. Returns how many were new.
    pub fn merge_messages(&mut self, incoming: Vec<MessageRecord>) -> usize {
        let mut positions: HashMap<String, usize> = self
            .messages
            .iter()
            .enumerate()
            .map(|(index, message)| (message.id.clone(), index))
            .collect();

        let mut added = 0;
        for message in incoming {
            match positions.get(&message.id) {
                Some(&index) => self.messages[index] = message,
                None => {
                    positions.insert(message.id.clone(), self.messages.len());
                    self.messages.push(message);
                    added += 1;
                }
            }
        }
        added
    }

    /// Replace stored group definitions with corrected ones, matched by id.
    pub fn apply_group_corrections(&mut self, updated: &[ManualThreadGroup]) -> usize {
        let mut applied = 0;
        for corrected in updated {
            if let Some(stored) = self.groups.iter_mut().find(|group| group.id == corrected.id) {
                *stored = corrected.clone();
                applied += 1;
            }
        }
        applied
    }

    /// Drop every definition whose id already appeared earlier.
    ///
    /// [`reconcile_groups`](crate::threading::reconcile_groups) ignores such
    /// repeats without reporting them, so the store removes them itself.
    pub fn dedupe_groups(&mut self) -> usize {
        let before = self.groups.len();
        let mut seen = BTreeSet::new();
        self.groups.retain(|group| seen.insert(group.id.clone()));
        before - self.groups.len()
    }

    /// Insert or replace a group definition.
    pub fn upsert_group(&mut self, group: ManualThreadGroup) {
        match self.groups.iter_mut().find(|stored| stored.id == group.id) {
            Some(stored) => *stored = group,
            None => self.groups.push(group),
        }
    }

    pub fn remove_group(&mut self, id: &str) -> bool {
        let before = self.groups.len();
        self.groups.retain(|group| group.id != id);
        self.groups.len() != before
    }

    /// Drop overrides the engine reported as unresolvable.
    pub fn prune_overrides(&mut self, invalid: &BTreeSet<MessageKey>) -> usize {
        let before = self.overrides.len();
        self.overrides.retain(|key, _| !invalid.contains(key));
        before - self.overrides.len()
    }

    /// Move every legacy override into the group model and clear the map.
    pub fn migrate_overrides(&mut self) -> usize {
        let migrated = self.overrides.len();
        self.groups = groups_from_overrides(&self.overrides, &self.groups);
        self.overrides.clear();
        migrated
    }
}

/// Convert single-message overrides into manual groups.
///
/// Overrides are bucketed by target thread. A bucket whose target thread is
/// already absorbed by an existing group adds its messages to that group as
/// pins; otherwise a new group `legacy-<thread id>` absorbs the target
/// thread and pins the messages. Messages already pinned somewhere are left
/// where they are. Running it twice is harmless.
pub fn groups_from_overrides(
    overrides: &BTreeMap<MessageKey, ThreadId>,
    groups: &[ManualThreadGroup],
) -> Vec<ManualThreadGroup> {
    let mut result = groups.to_vec();
    let mut already_pinned: BTreeSet<MessageKey> = groups
        .iter()
        .flat_map(|group| group.pinned_message_keys.iter().cloned())
        .collect();

    let mut by_target: BTreeMap<&ThreadId, Vec<&MessageKey>> = BTreeMap::new();
    for (key, target) in overrides {
        by_target.entry(target).or_default().push(key);
    }

    for (target, keys) in by_target {
        let index = match result
            .iter()
            .position(|group| group.jwz_thread_ids.contains(target))
        {
            Some(index) => index,
            None => {
                let mut group = ManualThreadGroup::with_id(format!("legacy-{}", target), None);
                group.jwz_thread_ids.insert(target.clone());
                result.push(group);
                result.len() - 1
            }
        };

        for key in keys {
            if already_pinned.insert(key.clone()) {
                result[index].pinned_message_keys.insert(key.clone());
            }
        }
    }

    result
}

/// Snapshot persisted as pretty JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnapshotStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot; a missing file is an empty snapshot.
    pub fn load(&self) -> Result<Snapshot, StoreError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("no snapshot at {}, starting empty", self.path.display());
                return Ok(Snapshot::default());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&data).map_err(|source| StoreError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    /// Write the snapshot atomically (temp file in the same directory, then rename).
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        std::fs::write(&tmp_path, &data).map_err(write_err)?;
        std::fs::rename(&tmp_path, &self.path).map_err(write_err)?;

        log::debug!(
            "saved snapshot to {} ({} messages, {} groups)",
            self.path.display(),
            snapshot.messages.len(),
            snapshot.groups.len()
        );
        Ok(())
    }
}
