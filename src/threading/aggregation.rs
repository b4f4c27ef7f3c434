//! Thread summaries
//!
//! Folds a finished tree into the [`EmailThread`] record renderers list.

use crate::models::{EmailThread, ThreadId, ThreadNode};

use super::algorithm::tree_traversal::preorder;

/// Summarize one root tree under the given thread id.
///
/// `last_updated` is the newest timestamp anywhere in the tree; the subject
/// and root id come from the root message.
pub fn summarize(id: ThreadId, root: &ThreadNode) -> EmailThread {
    let mut last_updated = root.message.date;
    let mut unread_count = 0;
    let mut message_count = 0;

    for visit in preorder(root) {
        let message = &visit.node.message;
        message_count += 1;
        if message.is_unread {
            unread_count += 1;
        }
        if message.date > last_updated {
            last_updated = message.date;
        }
    }

    EmailThread {
        id,
        root_message_id: root.message.normalized_id().map(|id| id.into_string()),
        subject: root.message.subject.clone(),
        last_updated,
        unread_count,
        message_count,
    }
}
