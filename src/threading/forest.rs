//! Flat, editable view of a thread forest
//!
//! The builder emits its pruned graph in this form and the manual layers
//! convert a finished [`ThreadingResult`] back into it, edit parent links,
//! and assemble a fresh result. Sharing one assembly path is what makes an
//! unchanged forest come back structurally identical.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{EmailThread, MessageKey, MessageRecord, ThreadId, ThreadNode, ThreadingResult};

use super::aggregation::summarize;
use super::algorithm::tree_traversal::{assemble_tree, preorder};

#[derive(Debug, Clone)]
struct Entry {
    record: MessageRecord,
    parent: Option<MessageKey>,
}

/// Trees, roots and summaries produced by [`Forest::assemble`].
#[derive(Debug, Default)]
pub(crate) struct Assembled {
    pub roots: Vec<ThreadNode>,
    pub threads: Vec<EmailThread>,
    /// Message key to the id of the tree it ended up in.
    pub membership: BTreeMap<MessageKey, ThreadId>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Forest {
    entries: HashMap<MessageKey, Entry>,
}

impl Forest {
    pub fn with_capacity(capacity: usize) -> Self {
        Forest {
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn from_result(result: &ThreadingResult) -> Self {
        let mut forest = Forest::with_capacity(result.effective_thread_ids.len());
        for root in &result.roots {
            for visit in preorder(root) {
                forest.insert(
                    visit.node.key.clone(),
                    visit.node.message.clone(),
                    visit.parent.map(|parent| parent.key.clone()),
                );
            }
        }
        forest
    }

    pub fn insert(&mut self, key: MessageKey, record: MessageRecord, parent: Option<MessageKey>) {
        self.entries.insert(key, Entry { record, parent });
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn record(&self, key: &str) -> Option<&MessageRecord> {
        self.entries.get(key).map(|entry| &entry.record)
    }

    pub fn parent(&self, key: &str) -> Option<&MessageKey> {
        self.entries.get(key).and_then(|entry| entry.parent.as_ref())
    }

    /// Chronological order with the key as tie-break.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let date_a = self.record(a).map(|record| record.date);
        let date_b = self.record(b).map(|record| record.date);
        date_a.cmp(&date_b).then_with(|| a.cmp(b))
    }

    /// Root keys without children, in chronological order.
    pub fn singleton_roots(&self) -> Vec<MessageKey> {
        let with_children: HashSet<&MessageKey> =
            self.entries.values().filter_map(|entry| entry.parent.as_ref()).collect();
        let mut singles: Vec<MessageKey> = self
            .entries
            .iter()
            .filter(|(key, entry)| entry.parent.is_none() && !with_children.contains(key))
            .map(|(key, _)| key.clone())
            .collect();
        singles.sort_by(|a, b| self.compare(a, b));
        singles
    }

    /// Topmost ancestor of `key` (the key itself when it is a root).
    pub fn top_root(&self, key: &str) -> MessageKey {
        let mut current = key.to_string();
        let mut visited = HashSet::new();
        while let Some(parent) = self.parent(&current) {
            if !visited.insert(current.clone()) {
                break;
            }
            current = parent.clone();
        }
        current
    }

    /// Lift a set of messages out of their trees at once.
    ///
    /// Every remaining message is re-attached to its nearest ancestor that
    /// stays. Messages left without one (their tree's root was lifted) are
    /// gathered per original tree: the earliest becomes the new root and
    /// adopts the others. The outcome depends only on the set, never on
    /// iteration order. Lifted messages end up as childless roots.
    pub fn detach_all<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lifted: HashSet<MessageKey> = keys
            .into_iter()
            .filter(|key| self.contains(key.as_ref()))
            .map(|key| key.as_ref().to_string())
            .collect();
        if lifted.is_empty() {
            return;
        }

        let mut reparent: Vec<(MessageKey, MessageKey)> = Vec::new();
        // topmost lifted ancestor -> survivors that lost every ancestor
        let mut orphans: BTreeMap<MessageKey, Vec<MessageKey>> = BTreeMap::new();

        for (key, entry) in &self.entries {
            if lifted.contains(key) {
                continue;
            }
            let Some(mut current) = entry.parent.clone() else {
                continue;
            };
            if !lifted.contains(&current) {
                continue;
            }
            let mut visited = HashSet::new();
            loop {
                match self.parent(&current) {
                    Some(next) if lifted.contains(next) && visited.insert(next.clone()) => {
                        current = next.clone();
                    }
                    Some(next) if !lifted.contains(next) => {
                        reparent.push((key.clone(), next.clone()));
                        break;
                    }
                    _ => {
                        orphans.entry(current).or_default().push(key.clone());
                        break;
                    }
                }
            }
        }

        for (child, parent) in reparent {
            self.set_parent(&child, Some(parent));
        }
        for (_, mut stranded) in orphans {
            stranded.sort_by(|a, b| self.compare(a, b));
            let mut stranded = stranded.into_iter();
            if let Some(heir) = stranded.next() {
                self.set_parent(&heir, None);
                for sibling in stranded {
                    self.set_parent(&sibling, Some(heir.clone()));
                }
            }
        }
        for key in &lifted {
            self.set_parent(key, None);
        }
    }

    /// Attach `key` under `parent`. Refuses links that would close a cycle.
    pub fn attach(&mut self, key: &str, parent: &str) -> bool {
        if !self.contains(key) || !self.contains(parent) {
            return false;
        }
        let mut current = Some(parent.to_string());
        let mut visited = HashSet::new();
        while let Some(ancestor) = current {
            if ancestor == key || !visited.insert(ancestor.clone()) {
                log::warn!("refusing to attach {} under {}: would create a cycle", key, parent);
                return false;
            }
            current = self.parent(&ancestor).cloned();
        }
        self.set_parent(key, Some(parent.to_string()));
        true
    }

    fn set_parent(&mut self, key: &str, parent: Option<MessageKey>) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.parent = parent;
        }
    }

    /// Turn the flat forest into ordered trees with summaries.
    ///
    /// Children are ordered chronologically; trees are ordered by most
    /// recent activity, then by thread id.
    pub fn assemble<F>(self, thread_id_for: F) -> Assembled
    where
        F: Fn(&ThreadNode) -> ThreadId,
    {
        let mut children: HashMap<MessageKey, Vec<MessageKey>> = HashMap::new();
        let mut root_keys = Vec::new();
        for (key, entry) in &self.entries {
            match &entry.parent {
                Some(parent) if self.entries.contains_key(parent) => {
                    children.entry(parent.clone()).or_default().push(key.clone());
                }
                _ => root_keys.push(key.clone()),
            }
        }
        for siblings in children.values_mut() {
            siblings.sort_by(|a, b| self.compare(a, b));
        }
        root_keys.sort_by(|a, b| self.compare(a, b));

        let mut records: HashMap<MessageKey, MessageRecord> = self
            .entries
            .into_iter()
            .map(|(key, entry)| (key, entry.record))
            .collect();

        let mut trees: Vec<(EmailThread, ThreadNode)> = root_keys
            .iter()
            .filter_map(|key| assemble_tree(key, &children, &mut records))
            .map(|root| (summarize(thread_id_for(&root), &root), root))
            .collect();

        if !records.is_empty() {
            log::warn!("{} messages were unreachable from any root", records.len());
        }

        trees.sort_by(|(a, _), (b, _)| {
            b.last_updated
                .cmp(&a.last_updated)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut assembled = Assembled::default();
        for (thread, root) in trees {
            for visit in preorder(&root) {
                assembled
                    .membership
                    .insert(visit.node.key.clone(), thread.id.clone());
            }
            assembled.threads.push(thread);
            assembled.roots.push(root);
        }
        assembled
    }
}
