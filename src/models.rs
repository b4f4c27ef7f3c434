use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::threading::identity::{NormalizedId, normalize};

/// Key a message is known by inside a threading result.
///
/// Usually the normalized Message-ID; see [`crate::threading::identity::thread_key`].
pub type MessageKey = String;

/// Externally visible thread identifier (algorithmic `thr-…` id or a group id).
pub type ThreadId = String;

// ===== Input Models =====

/// A single message as supplied by the message source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Persisted surrogate identity (store row id, content hash, ...).
    pub id: String,
    /// Raw Message-ID header value.
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub in_reply_to: Option<String>,
    /// References header, oldest first.
    #[serde(default)]
    pub references: Vec<String>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub is_unread: bool,
    /// Thread assignment the source already had, carried through untouched.
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl MessageRecord {
    pub fn new(id: impl Into<String>, message_id: impl Into<String>, date: DateTime<Utc>) -> Self {
        MessageRecord {
            id: id.into(),
            message_id: message_id.into(),
            in_reply_to: None,
            references: Vec::new(),
            date,
            subject: String::new(),
            is_unread: false,
            thread_id: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_in_reply_to(mut self, in_reply_to: impl Into<String>) -> Self {
        self.in_reply_to = Some(in_reply_to.into());
        self
    }

    pub fn with_references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references = references.into_iter().map(Into::into).collect();
        self
    }

    pub fn unread(mut self) -> Self {
        self.is_unread = true;
        self
    }

    /// Normalized Message-ID, `None` when the header is empty or degenerate.
    pub fn normalized_id(&self) -> Option<NormalizedId> {
        normalize(&self.message_id)
    }
}

// ===== Output Models =====

/// One message in the output forest together with its replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadNode {
    pub key: MessageKey,
    pub message: MessageRecord,
    pub children: Vec<ThreadNode>,
}

impl ThreadNode {
    pub fn leaf(key: MessageKey, message: MessageRecord) -> Self {
        ThreadNode {
            key,
            message,
            children: Vec::new(),
        }
    }
}

/// Summary of one root tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailThread {
    pub id: ThreadId,
    /// Normalized Message-ID of the root, if it has a usable one.
    pub root_message_id: Option<String>,
    pub subject: String,
    pub last_updated: DateTime<Utc>,
    pub unread_count: usize,
    pub message_count: usize,
}

/// A persisted, user-named merge of algorithmic threads and pinned messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualThreadGroup {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Algorithmic thread ids absorbed whole.
    #[serde(default)]
    pub jwz_thread_ids: BTreeSet<ThreadId>,
    /// Individual messages pulled into the group.
    #[serde(default)]
    pub pinned_message_keys: BTreeSet<MessageKey>,
}

impl ManualThreadGroup {
    /// Create an empty group with a fresh random id.
    pub fn new(title: Option<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), title)
    }

    pub fn with_id(id: impl Into<String>, title: Option<String>) -> Self {
        ManualThreadGroup {
            id: id.into(),
            title,
            jwz_thread_ids: BTreeSet::new(),
            pinned_message_keys: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.jwz_thread_ids.is_empty() && self.pinned_message_keys.is_empty()
    }
}

/// Value threaded through the builder, override and group layers.
///
/// `roots[i]` and `threads[i]` always describe the same tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadingResult {
    pub roots: Vec<ThreadNode>,
    pub threads: Vec<EmailThread>,
    /// Message key to the thread id the algorithm assigned.
    pub algorithmic_thread_ids: BTreeMap<MessageKey, ThreadId>,
    /// Message key to the thread id in effect after manual layers.
    pub effective_thread_ids: BTreeMap<MessageKey, ThreadId>,
    /// Messages moved by an override or a group pin.
    pub relocated: BTreeSet<MessageKey>,
    /// Message key to the manual group it currently belongs to.
    pub group_ids: BTreeMap<MessageKey, String>,
    /// Messages that are in a group because they were pinned individually.
    pub pinned: BTreeSet<MessageKey>,
}

impl ThreadingResult {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn message_count(&self) -> usize {
        self.threads.iter().map(|thread| thread.message_count).sum()
    }

    /// Look up a thread summary and its tree by id.
    pub fn thread(&self, id: &str) -> Option<(&EmailThread, &ThreadNode)> {
        self.threads
            .iter()
            .position(|thread| thread.id == id)
            .map(|index| (&self.threads[index], &self.roots[index]))
    }

    pub fn contains_thread(&self, id: &str) -> bool {
        self.threads.iter().any(|thread| thread.id == id)
    }
}
