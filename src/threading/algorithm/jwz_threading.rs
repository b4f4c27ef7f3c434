//! Core JWZ (Jamie Zawinski) threading algorithm implementation
//!
//! Implements the standard email threading algorithm as described at:
//! https://www.jwz.org/doc/threading.html
//!
//! ## Algorithm Overview
//!
//! 1. **Assign Keys**: Normalize ids, resolve duplicate Message-IDs
//! 2. **Create Containers**: Build containers for all messages and references
//! 3. **Link References**: Build parent-child relationships from References
//!    (In-Reply-To when References is empty)
//! 4. **Find Roots**: Identify containers with no parent
//! 5. **Prune**: Splice placeholder containers out of the tree
//! 6. **Group Strays**: Merge root singletons with matching subjects

use std::collections::HashSet;

use crate::models::{MessageKey, MessageRecord};

use super::super::container::ContainerArena;
use super::super::forest::Forest;
use super::super::identity::{fallback_key, normalize, thread_key};
use super::super::subject_matching::{SubjectNormalizer, group_stray_roots};
use super::cycle_detection::detect_cycle_in_ancestry;

/// A message with its final key and normalized reference chain.
#[derive(Debug)]
struct KeyedMessage<'a> {
    key: MessageKey,
    record: &'a MessageRecord,
    references: Vec<MessageKey>,
}

/// Thread messages into a flat forest
///
/// Processing order is derived from the keys, never from input order, so
/// any permutation of `messages` yields the same forest.
pub(crate) fn build_email_threads(
    messages: &[MessageRecord],
    subjects: Option<&SubjectNormalizer>,
) -> Forest {
    // Step 1: Assign unique keys and parse reference chains
    let keyed = assign_message_keys(messages);

    // Step 2: Create all message containers (real and placeholder)
    let mut arena = create_message_containers(&keyed);

    // Step 3: Build parent-child relationships
    build_reference_links(&mut arena, &keyed);

    // Step 4: Find root set
    let roots = arena.roots();

    // Step 5: Drop placeholders, keeping every real message
    let mut forest = prune_empty_containers(&arena, &roots, &keyed);

    // Step 6: Subject grouping of stray roots
    if let Some(normalizer) = subjects {
        let grouped = group_stray_roots(&mut forest, normalizer);
        log::trace!("subject grouping attached {} stray roots", grouped);
    }

    forest
}

/// Give every message a unique key
///
/// Duplicate Message-IDs are resolved deterministically: the most recent
/// message keeps the id, ties go to the greater record id. Every other
/// claimant is keyed by its record identity instead (`local:<id>`, with a
/// `#n` suffix if even that collides), so no message is ever dropped.
fn assign_message_keys(messages: &[MessageRecord]) -> Vec<KeyedMessage<'_>> {
    let mut candidates: Vec<(MessageKey, &MessageRecord)> = messages
        .iter()
        .map(|message| (thread_key(message), message))
        .collect();

    // Winners first within each key
    candidates.sort_by(|(key_a, a), (key_b, b)| {
        key_a
            .cmp(key_b)
            .then_with(|| b.date.cmp(&a.date))
            .then_with(|| b.id.cmp(&a.id))
    });

    let primaries: HashSet<MessageKey> = candidates.iter().map(|(key, _)| key.clone()).collect();
    let mut taken: HashSet<MessageKey> = HashSet::with_capacity(candidates.len());
    let mut keyed = Vec::with_capacity(candidates.len());

    for (key, record) in candidates {
        let key = if taken.contains(&key) {
            let base = fallback_key(record);
            let mut alternative = base.clone();
            let mut suffix = 1;
            while primaries.contains(&alternative) || taken.contains(&alternative) {
                suffix += 1;
                alternative = format!("{}#{}", base, suffix);
            }
            log::debug!(
                "duplicate message id {} on record {}, keyed as {}",
                key,
                record.id,
                alternative
            );
            alternative
        } else {
            key
        };
        taken.insert(key.clone());

        let references = reference_chain(record, &key);
        keyed.push(KeyedMessage {
            key,
            record,
            references,
        });
    }

    keyed.sort_by(|a, b| a.key.cmp(&b.key));
    keyed
}

/// Normalized ancestor ids of a message, oldest first
///
/// Uses References, falling back to In-Reply-To when References carries
/// nothing usable. Invalid ids, self references and consecutive repeats are
/// dropped.
fn reference_chain(record: &MessageRecord, own_key: &str) -> Vec<MessageKey> {
    let own_id = record.normalized_id();
    let is_self = |id: &str| id == own_key || own_id.as_ref().is_some_and(|own| own == id);

    let mut chain: Vec<MessageKey> = record
        .references
        .iter()
        .flat_map(|entry| entry.split_whitespace())
        .filter_map(normalize)
        .map(|id| id.into_string())
        .filter(|id| !is_self(id.as_str()))
        .collect();

    if chain.is_empty() {
        if let Some(parent) = record.in_reply_to.as_deref().and_then(normalize) {
            if !is_self(parent.as_str()) {
                chain.push(parent.into_string());
            }
        }
    }

    chain.dedup();
    chain
}

/// Create containers for all messages and all referenced ids
fn create_message_containers(keyed: &[KeyedMessage<'_>]) -> ContainerArena {
    let mut arena = ContainerArena::with_capacity(keyed.len());

    for (index, message) in keyed.iter().enumerate() {
        arena.insert_message(&message.key, index);
    }

    // Placeholders for everything referenced but not present
    for message in keyed {
        for reference in &message.references {
            arena.get_or_insert_placeholder(reference);
        }
    }

    arena
}

/// Build parent-child relationships from reference chains
///
/// ## Example
///
/// ```text
/// Email has References: <msg1> <msg2> <msg3>
///
/// Creates links:
///   msg1 (parent) → msg2 (child)   if msg2 has no parent yet
///   msg2 (parent) → msg3 (child)   if msg3 has no parent yet
///   msg3 (parent) → this_email     always attempted
/// ```
///
/// A message's own last reference is authoritative and may re-parent it;
/// links between intermediate references never override an existing one.
fn build_reference_links(arena: &mut ContainerArena, keyed: &[KeyedMessage<'_>]) {
    for message in keyed {
        let chain: Vec<usize> = message
            .references
            .iter()
            .filter_map(|reference| arena.lookup(reference))
            .collect();

        for pair in chain.windows(2) {
            let (parent, child) = (pair[0], pair[1]);
            if arena.parent_of(child).is_none() {
                link_child_to_parent(arena, child, parent);
            }
        }

        if let (Some(own), Some(&last)) = (arena.lookup(&message.key), chain.last()) {
            link_child_to_parent(arena, own, last);
        }
    }
}

/// Link a child to a parent if safe to do so
///
/// Refuses self-loops and links that would make the parent a descendant
/// of the child.
fn link_child_to_parent(arena: &mut ContainerArena, child: usize, parent: usize) -> bool {
    if child == parent {
        return false;
    }
    if arena.parent_of(child) == Some(parent) {
        return true;
    }
    if detect_cycle_in_ancestry(arena, child, parent) {
        log::trace!(
            "skipping link {} -> {}: would create a cycle",
            arena.get(parent).key,
            arena.get(child).key
        );
        return false;
    }
    arena.link(child, parent);
    true
}

/// Flatten the container graph into a forest of real messages
///
/// Walks each root depth-first carrying the nearest message-bearing
/// ancestor; every message is re-parented onto that ancestor, which splices
/// placeholders out while keeping their children in order. Placeholder
/// roots hand their children to the root set.
fn prune_empty_containers(
    arena: &ContainerArena,
    roots: &[usize],
    keyed: &[KeyedMessage<'_>],
) -> Forest {
    let mut forest = Forest::with_capacity(keyed.len());
    let mut stack: Vec<(usize, Option<usize>)> = roots.iter().rev().map(|&root| (root, None)).collect();

    while let Some((index, nearest)) = stack.pop() {
        let container = arena.get(index);
        let nearest_for_children = match container.message {
            Some(message_index) => {
                let message = &keyed[message_index];
                forest.insert(
                    message.key.clone(),
                    message.record.clone(),
                    nearest.map(|ancestor| keyed[ancestor].key.clone()),
                );
                Some(message_index)
            }
            None => nearest,
        };

        for &child in container.children.iter().rev() {
            stack.push((child, nearest_for_children));
        }
    }

    forest
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn create_test_email(id: &str, message_id: &str, minutes: i64) -> MessageRecord {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        MessageRecord::new(id, message_id, start + Duration::minutes(minutes))
            .with_subject(format!("Test {}", id))
    }

    fn parent_of(forest: &Forest, key: &str) -> Option<String> {
        forest.parent(key).cloned()
    }

    #[test]
    fn test_simple_thread() {
        let messages = vec![
            create_test_email("1", "<msg1>", 0),
            create_test_email("2", "<msg2>", 1).with_references(["<msg1>"]),
        ];

        let forest = build_email_threads(&messages, None);

        assert_eq!(parent_of(&forest, "msg2").as_deref(), Some("msg1"));
        assert!(parent_of(&forest, "msg1").is_none());
    }

    #[test]
    fn test_in_reply_to_fallback() {
        let messages = vec![
            create_test_email("1", "<msg1>", 0),
            create_test_email("2", "<msg2>", 1).with_in_reply_to("<MSG1>"),
        ];

        let forest = build_email_threads(&messages, None);
        assert_eq!(parent_of(&forest, "msg2").as_deref(), Some("msg1"));
    }

    #[test]
    fn test_references_win_over_in_reply_to() {
        let messages = vec![
            create_test_email("1", "<a>", 0),
            create_test_email("2", "<b>", 1),
            create_test_email("3", "<c>", 2)
                .with_references(["<a>"])
                .with_in_reply_to("<b>"),
        ];

        let forest = build_email_threads(&messages, None);
        assert_eq!(parent_of(&forest, "c").as_deref(), Some("a"));
    }

    #[test]
    fn test_placeholder_parent_is_spliced() {
        // msg2 and msg3 both reply to a message we never saw; msg4 replies to msg3
        // through a missing intermediate.
        let messages = vec![
            create_test_email("2", "<msg2>", 1).with_references(["<missing>"]),
            create_test_email("3", "<msg3>", 2).with_references(["<missing>"]),
            create_test_email("4", "<msg4>", 3).with_references(["<missing>", "<msg3>", "<gone>"]),
        ];

        let forest = build_email_threads(&messages, None);

        assert!(parent_of(&forest, "msg2").is_none());
        assert!(parent_of(&forest, "msg3").is_none());
        assert_eq!(parent_of(&forest, "msg4").as_deref(), Some("msg3"));
        assert!(!forest.contains("missing"));
        assert!(!forest.contains("gone"));
    }

    #[test]
    fn test_mutual_references_do_not_cycle() {
        let messages = vec![
            create_test_email("a", "<a>", 0).with_references(["<b>"]),
            create_test_email("b", "<b>", 1).with_references(["<a>"]),
        ];

        let forest = build_email_threads(&messages, None);

        let a_parent = parent_of(&forest, "a");
        let b_parent = parent_of(&forest, "b");
        // exactly one of them is the root
        assert!(a_parent.is_none() ^ b_parent.is_none());
        assert_ne!(forest.top_root("a"), "");
        assert_eq!(forest.top_root("a"), forest.top_root("b"));
    }

    #[test]
    fn test_self_reference_ignored() {
        let messages = vec![create_test_email("a", "<a>", 0).with_references(["<a>", "<A>"])];
        let forest = build_email_threads(&messages, None);
        assert!(parent_of(&forest, "a").is_none());
    }

    #[test]
    fn test_duplicate_message_id_newest_wins() {
        let messages = vec![
            create_test_email("old", "<dup>", 0),
            create_test_email("new", "<dup>", 5),
            create_test_email("reply", "<reply>", 6).with_references(["<dup>"]),
        ];

        let forest = build_email_threads(&messages, None);

        assert_eq!(forest.record("dup").map(|r| r.id.as_str()), Some("new"));
        assert_eq!(forest.record("local:old").map(|r| r.id.as_str()), Some("old"));
        assert_eq!(parent_of(&forest, "reply").as_deref(), Some("dup"));
    }

    #[test]
    fn test_duplicate_same_date_uses_record_id() {
        let messages = vec![
            create_test_email("b", "<dup>", 0),
            create_test_email("a", "<dup>", 0),
        ];
        let forest = build_email_threads(&messages, None);
        assert_eq!(forest.record("dup").map(|r| r.id.as_str()), Some("b"));
        assert!(forest.contains("local:a"));
    }

    #[test]
    fn test_fallback_collision_gets_suffix() {
        let messages = vec![
            create_test_email("x", "", 0),
            create_test_email("x", "<dup>", 1),
            create_test_email("y", "<dup>", 2),
        ];
        let forest = build_email_threads(&messages, None);
        assert!(forest.contains("local:x"));
        assert!(forest.contains("local:x#2"));
        assert!(forest.contains("dup"));
    }
}
