//! Tree traversal utilities for email threading
//!
//! All functions use explicit stacks instead of recursion so deeply nested
//! threads (long reply chains) cannot overflow the call stack.

use std::collections::HashMap;

use crate::models::{MessageKey, MessageRecord, ThreadNode};

/// A node reached during a traversal, with its parent and depth.
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    pub node: &'a ThreadNode,
    pub parent: Option<&'a ThreadNode>,
    pub depth: usize,
}

/// Depth-first, pre-order listing of a tree, children left to right.
pub fn preorder(root: &ThreadNode) -> Vec<Visit<'_>> {
    let mut visits = Vec::new();
    let mut stack = vec![(root, None, 0usize)];

    while let Some((node, parent, depth)) = stack.pop() {
        visits.push(Visit {
            node,
            parent,
            depth,
        });

        // Reverse so the first child is visited first
        for child in node.children.iter().rev() {
            stack.push((child, Some(node), depth + 1));
        }
    }

    visits
}

/// Keys of every message in a tree, pre-order.
pub fn collect_keys(root: &ThreadNode) -> Vec<&MessageKey> {
    preorder(root).into_iter().map(|visit| &visit.node.key).collect()
}

/// Build an owned tree from a flat parent → children table.
///
/// Records are moved out of `records`; children lists must already be in
/// output order. Nodes are assembled bottom-up from a reversed pre-order
/// so no recursion is needed.
pub(crate) fn assemble_tree(
    root_key: &MessageKey,
    children: &HashMap<MessageKey, Vec<MessageKey>>,
    records: &mut HashMap<MessageKey, MessageRecord>,
) -> Option<ThreadNode> {
    let mut order = Vec::new();
    let mut stack = vec![root_key];
    while let Some(key) = stack.pop() {
        order.push(key);
        if let Some(child_keys) = children.get(key) {
            stack.extend(child_keys.iter().rev());
        }
    }

    let mut built: HashMap<&MessageKey, ThreadNode> = HashMap::with_capacity(order.len());
    for key in order.into_iter().rev() {
        let message = records.remove(key)?;
        let node_children = children
            .get(key)
            .map(|child_keys| {
                child_keys
                    .iter()
                    .filter_map(|child| built.remove(child))
                    .collect()
            })
            .unwrap_or_default();
        built.insert(
            key,
            ThreadNode {
                key: key.clone(),
                message,
                children: node_children,
            },
        );
    }

    built.remove(root_key)
}
