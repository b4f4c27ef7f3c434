//! Manual per-message overrides
//!
//! An override forces one message into a chosen thread. Overrides are always
//! applied to a freshly built result, never stacked on an earlier overridden
//! one, so dropping an override from the map restores the algorithmic
//! placement exactly.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::models::{MessageKey, ThreadId, ThreadingResult};

use super::algorithm::tree_traversal::collect_keys;
use super::forest::Forest;
use super::identity::thread_identifier;

/// Relocate messages into their override target threads.
///
/// Every target is resolved against `base` before anything moves. Keys whose
/// target thread or message is not in `base` are returned as invalid. All
/// moved messages are lifted out together (their replies stay behind, see
/// [`Forest::detach_all`]), then each is attached directly under the root of
/// whatever is left of its target tree, found through that tree's earliest
/// message that is not being moved. An override whose target tree is moved
/// away entirely is skipped.
pub fn apply_overrides(
    overrides: &BTreeMap<MessageKey, ThreadId>,
    base: &ThreadingResult,
) -> (ThreadingResult, BTreeSet<MessageKey>) {
    let mut invalid = BTreeSet::new();
    if overrides.is_empty() {
        return (base.clone(), invalid);
    }

    let thread_index: HashMap<&str, usize> = base
        .threads
        .iter()
        .enumerate()
        .map(|(index, thread)| (thread.id.as_str(), index))
        .collect();

    let mut forest = Forest::from_result(base);
    let mut moves: Vec<(&MessageKey, usize)> = Vec::new();

    for (key, target) in overrides {
        let Some(&index) = thread_index.get(target.as_str()) else {
            log::debug!("override {} -> {}: target thread not found", key, target);
            invalid.insert(key.clone());
            continue;
        };
        if !forest.contains(key) {
            log::debug!("override {} -> {}: message not found", key, target);
            invalid.insert(key.clone());
            continue;
        }
        // already in the target thread
        if base.effective_thread_ids.get(key) == Some(target) {
            continue;
        }
        moves.push((key, index));
    }

    let moving: HashSet<&MessageKey> = moves.iter().map(|(key, _)| *key).collect();

    // Earliest message of each target tree that stays put
    let mut anchors: HashMap<usize, Option<MessageKey>> = HashMap::new();
    for &(_, index) in &moves {
        anchors.entry(index).or_insert_with(|| {
            let mut stays: Vec<&MessageKey> = collect_keys(&base.roots[index])
                .into_iter()
                .filter(|key| !moving.contains(key))
                .collect();
            stays.sort_by(|a, b| forest.compare(a, b));
            stays.first().map(|key| (*key).clone())
        });
    }

    moves.retain(|(key, index)| match anchors.get(index) {
        Some(Some(_)) => true,
        _ => {
            log::debug!(
                "override {} -> {}: every message of the target is moving away",
                key,
                base.threads[*index].id
            );
            false
        }
    });
    forest.detach_all(moves.iter().map(|(key, _)| *key));

    let mut relocated = base.relocated.clone();
    for (key, index) in moves {
        let Some(Some(anchor)) = anchors.get(&index) else {
            continue;
        };
        let root = forest.top_root(anchor);
        if forest.attach(key, &root) {
            relocated.insert(key.clone());
        }
    }

    if !invalid.is_empty() {
        log::debug!("{} of {} overrides could not be applied", invalid.len(), overrides.len());
    }

    let assembled = forest.assemble(thread_identifier);
    let result = ThreadingResult {
        roots: assembled.roots,
        threads: assembled.threads,
        algorithmic_thread_ids: base.algorithmic_thread_ids.clone(),
        effective_thread_ids: assembled.membership,
        relocated,
        group_ids: base.group_ids.clone(),
        pinned: base.pinned.clone(),
    };
    (result, invalid)
}
