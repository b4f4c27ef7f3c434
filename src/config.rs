use std::env;

/// Reply/forward markers stripped before stray roots are compared by subject.
///
/// English plus the common German, Scandinavian, Dutch and French client
/// prefixes.
pub const DEFAULT_REPLY_MARKERS: &[&str] = &["re", "fwd", "fw", "aw", "sv", "vs", "antw", "wg", "tr"];

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(value) => value
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Err(_) => default.iter().map(|item| item.to_string()).collect(),
    }
}

/// Threading policy knobs.
///
/// `Default` is the built-in policy; the environment is only consulted
/// through [`ThreadingConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadingConfig {
    /// Merge root singletons with matching subjects.
    pub group_by_subject: bool,
    pub reply_markers: Vec<String>,
    /// Also strip leading `[tag]` blocks (mailing list names, `[PATCH]`).
    pub strip_subject_tags: bool,
}

impl ThreadingConfig {
    pub fn from_env() -> Self {
        Self {
            group_by_subject: env_bool("THREADING_GROUP_BY_SUBJECT", true),
            reply_markers: env_list("THREADING_REPLY_MARKERS", DEFAULT_REPLY_MARKERS),
            strip_subject_tags: env_bool("THREADING_STRIP_SUBJECT_TAGS", false),
        }
    }
}

impl Default for ThreadingConfig {
    fn default() -> Self {
        Self {
            group_by_subject: true,
            reply_markers: DEFAULT_REPLY_MARKERS.iter().map(|m| m.to_string()).collect(),
            strip_subject_tags: false,
        }
    }
}
