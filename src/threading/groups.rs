//! Manual thread groups
//!
//! A [`ManualThreadGroup`] merges whole algorithmic threads plus individually
//! pinned messages into one user-visible thread whose id is the group's own
//! persistent id. Membership is re-resolved against the current result on
//! every pass; only conflicts between groups change stored definitions.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::{ManualThreadGroup, MessageKey, ThreadId, ThreadingResult};

use super::forest::Forest;
use super::identity::thread_identifier;

/// Resolve overlapping claims between groups
///
/// Groups are visited in slice order. The first group to list a thread id
/// or pinned message keeps it; later groups have it removed. Returns the
/// effective definitions and, separately, every definition that changed
/// (which the caller must persist). Stale ids are left alone, and a repeated
/// group id is ignored after its first definition.
pub fn reconcile_groups(
    groups: &[ManualThreadGroup],
) -> (Vec<ManualThreadGroup>, Vec<ManualThreadGroup>) {
    let mut seen_ids = HashSet::new();
    let mut thread_owner: HashMap<ThreadId, String> = HashMap::new();
    let mut pin_owner: HashMap<MessageKey, String> = HashMap::new();
    let mut effective = Vec::with_capacity(groups.len());
    let mut updated = Vec::new();

    for group in groups {
        if !seen_ids.insert(group.id.as_str()) {
            log::warn!("duplicate group id {}, ignoring later definition", group.id);
            continue;
        }

        let mut corrected = group.clone();
        corrected
            .jwz_thread_ids
            .retain(|thread_id| claim(&mut thread_owner, thread_id, &group.id, "thread"));
        corrected
            .pinned_message_keys
            .retain(|key| claim(&mut pin_owner, key, &group.id, "message"));

        if corrected != *group {
            updated.push(corrected.clone());
        }
        effective.push(corrected);
    }

    (effective, updated)
}

fn claim(owners: &mut HashMap<String, String>, item: &str, group_id: &str, kind: &str) -> bool {
    match owners.entry(item.to_string()) {
        Entry::Occupied(owner) => {
            log::info!(
                "group {} loses {} {} already claimed by group {}",
                group_id,
                kind,
                item,
                owner.get()
            );
            false
        }
        Entry::Vacant(slot) => {
            slot.insert(group_id.to_string());
            true
        }
    }
}

/// Merge threads and pinned messages into their groups.
///
/// Listed thread ids are algorithmic ids: a group absorbs every message the
/// algorithm put in that thread, wherever the current trees have it, except
/// messages an override relocated. The constituent roots are the current
/// top roots of those messages and the earliest becomes the merged root;
/// the other roots and every pinned message become its direct children. A
/// group with no surviving threads is rooted at its earliest pinned message.
/// A pinned message is always lifted out of wherever it was, even from a
/// thread another group absorbed. Pins the group's own threads already
/// bring along are left in place.
///
/// Returns the merged result and the group definitions corrected by
/// [`reconcile_groups`].
pub fn apply_groups(
    groups: &[ManualThreadGroup],
    base: &ThreadingResult,
) -> (ThreadingResult, Vec<ManualThreadGroup>) {
    let (effective, updated) = reconcile_groups(groups);

    let mut algorithmic_members: HashMap<&str, Vec<&MessageKey>> = HashMap::new();
    for (key, thread_id) in &base.algorithmic_thread_ids {
        if !base.relocated.contains(key) {
            algorithmic_members.entry(thread_id.as_str()).or_default().push(key);
        }
    }

    let mut forest = Forest::from_result(base);

    // Lift pinned messages out first so constituent trees resolve without them
    let pins_per_group: Vec<Vec<MessageKey>> = effective
        .iter()
        .map(|group| {
            let mut pins: Vec<MessageKey> = group
                .pinned_message_keys
                .iter()
                .filter(|key| forest.contains(key))
                .filter(|key| !carried_by_own_thread(group, base, key))
                .cloned()
                .collect();
            pins.sort_by(|a, b| forest.compare(a, b));
            pins
        })
        .collect();
    let all_pins: BTreeSet<&MessageKey> = pins_per_group.iter().flatten().collect();
    forest.detach_all(all_pins.iter());

    let mut group_roots: HashMap<MessageKey, &ManualThreadGroup> = HashMap::new();
    let mut pinned = BTreeSet::new();

    for (group, pins) in effective.iter().zip(&pins_per_group) {
        let mut anchors: Vec<MessageKey> = Vec::new();
        for thread_id in &group.jwz_thread_ids {
            let Some(members) = algorithmic_members.get(thread_id.as_str()) else {
                log::debug!("group {}: thread {} no longer exists", group.id, thread_id);
                continue;
            };
            for key in members
                .iter()
                .filter(|key| !all_pins.contains(*key) && forest.contains(key))
            {
                let anchor = forest.top_root(key);
                if !anchors.contains(&anchor) {
                    anchors.push(anchor);
                }
            }
        }
        anchors.sort_by(|a, b| forest.compare(a, b));

        let Some(root) = anchors.first().or(pins.first()).cloned() else {
            log::debug!("group {} has no members in this pass", group.id);
            continue;
        };
        for member in anchors.iter().chain(pins.iter()) {
            if *member != root {
                forest.attach(member, &root);
            }
        }

        pinned.extend(pins.iter().cloned());
        group_roots.insert(root, group);
    }

    let assembled = forest.assemble(|root| {
        group_roots
            .get(&root.key)
            .map(|group| group.id.clone())
            .unwrap_or_else(|| thread_identifier(root))
    });

    let materialized: HashMap<&str, &ManualThreadGroup> = group_roots
        .values()
        .map(|group| (group.id.as_str(), *group))
        .collect();

    let mut threads = assembled.threads;
    for thread in &mut threads {
        if let Some(title) = materialized
            .get(thread.id.as_str())
            .and_then(|group| group.title.as_ref())
        {
            thread.subject = title.clone();
        }
    }

    let group_ids = assembled
        .membership
        .iter()
        .filter(|(_, thread_id)| materialized.contains_key(thread_id.as_str()))
        .map(|(key, thread_id)| (key.clone(), thread_id.clone()))
        .collect();

    let mut relocated = base.relocated.clone();
    relocated.extend(pinned.iter().cloned());

    log::debug!(
        "applied {} of {} manual groups ({} corrected)",
        materialized.len(),
        groups.len(),
        updated.len()
    );

    let result = ThreadingResult {
        roots: assembled.roots,
        threads,
        algorithmic_thread_ids: base.algorithmic_thread_ids.clone(),
        effective_thread_ids: assembled.membership,
        relocated,
        group_ids,
        pinned,
    };
    (result, updated)
}

/// True when `key` already sits in one of the group's own threads and an
/// override has not moved it out.
fn carried_by_own_thread(group: &ManualThreadGroup, base: &ThreadingResult, key: &str) -> bool {
    !base.relocated.contains(key)
        && base
            .algorithmic_thread_ids
            .get(key)
            .is_some_and(|thread_id| group.jwz_thread_ids.contains(thread_id))
}
