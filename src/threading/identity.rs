//! Message identity and normalization
//!
//! Message-IDs arrive in many shapes (`<Foo@Bar>`, ` foo@bar `, mixed case).
//! Everything the threading code compares goes through [`normalize`] first so
//! that the same logical message always maps to the same key.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{MessageKey, MessageRecord, ThreadId, ThreadNode};

/// Prefix for keys derived from a record's stored identity.
pub const LOCAL_KEY_PREFIX: &str = "local:";

/// Prefix of algorithmic thread ids.
pub const THREAD_ID_PREFIX: &str = "thr-";

/// A canonical, non-empty Message-ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedId(String);

impl NormalizedId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for NormalizedId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NormalizedId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Canonicalize a raw Message-ID.
///
/// Trims surrounding whitespace, strips one enclosing pair of angle brackets
/// and lowercases. Returns `None` when nothing usable is left.
///
/// ```rust
/// use mail_threader::threading::identity::normalize;
///
/// assert_eq!(normalize(" <Test@Example.com> ").unwrap(), "test@example.com");
/// assert!(normalize("  <>  ").is_none());
/// ```
pub fn normalize(raw: &str) -> Option<NormalizedId> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(trimmed)
        .trim();

    if inner.is_empty() {
        None
    } else {
        Some(NormalizedId(inner.to_lowercase()))
    }
}

/// Key used for a message throughout threading.
///
/// The normalized Message-ID when there is one, otherwise [`fallback_key`].
pub fn thread_key(message: &MessageRecord) -> MessageKey {
    match message.normalized_id() {
        Some(id) => id.into_string(),
        None => fallback_key(message),
    }
}

/// Key derived from the record's persisted id, independent of its headers.
pub fn fallback_key(message: &MessageRecord) -> MessageKey {
    format!("{}{}", LOCAL_KEY_PREFIX, message.id.trim())
}

/// Stable thread id for a tree, derived from its root's key.
pub fn thread_identifier(root: &ThreadNode) -> ThreadId {
    thread_id_for_key(&root.key)
}

/// Thread id a tree rooted at `key` receives: `thr-` plus 16 hex digits of SHA-256.
pub fn thread_id_for_key(key: &str) -> ThreadId {
    let digest = Sha256::digest(key.as_bytes());
    let hex: String = digest.iter().take(8).map(|byte| format!("{byte:02x}")).collect();
    format!("{THREAD_ID_PREFIX}{hex}")
}
