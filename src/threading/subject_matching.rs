//! Subject normalization and matching for email threading
//!
//! When email headers (In-Reply-To, References) are missing, stray root
//! messages that share a subject are still one conversation. This module
//! strips reply/forward markers so such subjects compare equal, and groups
//! those roots after the header-based pass.
//!
//! The marker list is policy, not protocol: it comes from
//! [`ThreadingConfig::reply_markers`](crate::config::ThreadingConfig).

use std::collections::BTreeMap;

use regex::Regex;

use super::forest::Forest;

/// Strips leading reply/forward markers from subjects.
#[derive(Debug, Clone)]
pub struct SubjectNormalizer {
    /// Matches one leading marker such as `re:`, `fwd :`, `re[2]:`
    prefix: Option<Regex>,
    strip_tags: bool,
}

impl SubjectNormalizer {
    pub fn new<S: AsRef<str>>(markers: &[S], strip_tags: bool) -> Self {
        let alternatives: Vec<String> = markers
            .iter()
            .map(|marker| marker.as_ref().trim().to_lowercase())
            .filter(|marker| !marker.is_empty())
            .map(|marker| regex::escape(&marker))
            .collect();

        let prefix = if alternatives.is_empty() {
            None
        } else {
            let pattern = format!(
                r"^(?:{})\s*(?:\[\d+\]|\(\d+\))?\s*:",
                alternatives.join("|")
            );
            match Regex::new(&pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    log::warn!("invalid reply marker pattern, markers ignored: {}", e);
                    None
                }
            }
        };

        SubjectNormalizer { prefix, strip_tags }
    }

    /// Normalize an email subject for threading comparison
    ///
    /// Lowercases, repeatedly strips leading markers (and bracketed tags
    /// such as `[list]` when enabled), then collapses whitespace.
    ///
    /// ```rust
    /// use mail_threader::threading::subject_matching::SubjectNormalizer;
    ///
    /// let normalizer = SubjectNormalizer::new(&["re", "fwd"], false);
    /// assert_eq!(normalizer.normalize("Re: Fwd:  Lunch   plans"), "lunch plans");
    /// ```
    pub fn normalize(&self, subject: &str) -> String {
        let mut normalized = subject.trim().to_lowercase();

        // Keep removing prefixes until none match
        loop {
            let before = normalized.len();

            if let Some(found) = self.prefix.as_ref().and_then(|re| re.find(&normalized)) {
                normalized = normalized[found.end()..].trim_start().to_string();
            }

            if self.strip_tags && normalized.starts_with('[') {
                if let Some(end_bracket) = normalized.find(']') {
                    normalized = normalized[end_bracket + 1..].trim_start().to_string();
                }
            }

            // Only ever shrinks, so an unchanged length means nothing matched
            if before == normalized.len() {
                break;
            }
        }

        // Collapse multiple spaces into one
        normalized.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Merge root singletons that share a normalized subject
///
/// ## Algorithm
///
/// 1. Index every root without children by normalized subject
/// 2. For each subject with two or more roots, the earliest one becomes
///    the thread root and the rest become its direct children
///
/// Empty subjects never group.
pub(crate) fn group_stray_roots(forest: &mut Forest, normalizer: &SubjectNormalizer) -> usize {
    let mut subject_index: BTreeMap<String, Vec<String>> = BTreeMap::new();

    // singleton_roots is chronological, so each bucket is too
    for key in forest.singleton_roots() {
        let Some(record) = forest.record(&key) else {
            continue;
        };
        let subject = normalizer.normalize(&record.subject);
        if subject.is_empty() {
            continue;
        }
        subject_index.entry(subject).or_default().push(key);
    }

    let mut grouped = 0;
    for (subject, members) in subject_index {
        let Some((root, rest)) = members.split_first() else {
            continue;
        };
        for member in rest {
            if forest.attach(member, root) {
                grouped += 1;
            }
        }
        if !rest.is_empty() {
            log::trace!("grouped {} stray roots under {} ({})", rest.len(), root, subject);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REPLY_MARKERS;
    use crate::models::MessageRecord;
    use chrono::{Duration, TimeZone, Utc};

    fn normalizer() -> SubjectNormalizer {
        SubjectNormalizer::new(DEFAULT_REPLY_MARKERS, false)
    }

    #[test]
    fn test_normalize_basic_reply() {
        assert_eq!(normalizer().normalize("Re: Fix memory leak"), "fix memory leak");
    }

    #[test]
    fn test_normalize_multiple_prefixes() {
        assert_eq!(normalizer().normalize("RE: Fwd: re: Test"), "test");
    }

    #[test]
    fn test_normalize_counted_and_spaced_markers() {
        assert_eq!(normalizer().normalize("Re[2]: Re (3): AW : Budget"), "budget");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalizer().normalize("  Re:   Multiple    spaces  "),
            "multiple spaces"
        );
    }

    #[test]
    fn test_marker_must_be_whole_prefix() {
        // "Reply" is not "Re:"
        assert_eq!(normalizer().normalize("Reply needed"), "reply needed");
        assert_eq!(normalizer().normalize("Regarding: x"), "regarding: x");
    }

    #[test]
    fn test_tags_kept_unless_enabled() {
        assert_eq!(normalizer().normalize("Re: [dev] Build"), "[dev] build");
        let tagged = SubjectNormalizer::new(DEFAULT_REPLY_MARKERS, true);
        assert_eq!(tagged.normalize("Re: [dev] Re: Build"), "build");
    }

    #[test]
    fn test_no_markers_only_collapses() {
        let plain = SubjectNormalizer::new::<&str>(&[], false);
        assert_eq!(plain.normalize("Re:  Hello"), "re: hello");
    }

    #[test]
    fn test_group_stray_roots_picks_earliest() {
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut forest = Forest::default();
        for (key, hours, subject) in [
            ("late", 5, "Re: Offsite"),
            ("early", 1, "Offsite"),
            ("other", 2, "Unrelated"),
            ("blank", 3, "Re:"),
            ("blank2", 4, ""),
        ] {
            let record =
                MessageRecord::new(key, key, start + Duration::hours(hours)).with_subject(subject);
            forest.insert(key.to_string(), record, None);
        }

        let grouped = group_stray_roots(&mut forest, &normalizer());

        assert_eq!(grouped, 1);
        assert_eq!(forest.parent("late").map(String::as_str), Some("early"));
        assert!(forest.parent("other").is_none());
        assert!(forest.parent("blank").is_none());
        assert!(forest.parent("blank2").is_none());
    }
}
