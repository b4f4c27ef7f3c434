//! Raw message parsing.
//!
//! Turns RFC 5322 bytes (a maildir file, an `.eml` export) into the
//! [`MessageRecord`] the threading engine consumes. It uses the `mailparse`
//! crate for MIME parsing and `dateparser` for the many Date header dialects
//! found in the wild.
//!
//! # Threading Fields
//!
//! - **message_id**: kept as found (trimmed); the engine normalizes it and
//!   falls back to the record id when it is missing
//! - **in_reply_to**: first `<...>` token of the header
//! - **references**: every `<...>` token, oldest first
//!
//! # Record Identity
//!
//! The record id is the SHA-256 of the raw bytes, so re-ingesting the same
//! file always yields the same id (and the same fallback thread key).
//!
//! # Read State
//!
//! Maildir file names carry flags after `:2,`; `S` means seen. Without those,
//! the mbox `Status` header decides (`R` means read). A message with neither
//! is treated as unread.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use mailparse::{MailHeaderMap, parse_mail};
use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::MessageRecord;

/// Maximum tolerated clock skew for future-dated emails.
const MAX_FUTURE_SKEW: Duration = Duration::hours(24);

/// Lazy-initialized regex for `<message-id>` tokens
static MESSAGE_ID_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_message_id_regex() -> &'static Regex {
    MESSAGE_ID_REGEX.get_or_init(|| Regex::new(r"<([^<>\s]+)>").expect("Invalid message id regex"))
}

/// Errors that can be returned while parsing a message.
#[derive(Debug, Error)]
pub enum ParseMessageError {
    #[error("failed to parse MIME structure: {0}")]
    MimeParse(#[from] mailparse::MailParseError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing Date header for record {record_id}")]
    MissingDate { record_id: String },
    #[error("invalid Date header `{raw}` for record {record_id}: {error}")]
    InvalidDate {
        record_id: String,
        raw: String,
        error: String,
    },
    #[error("future Date header `{raw}` for record {record_id}")]
    FutureDate { record_id: String, raw: String },
}

/// Remove NUL bytes and surrounding whitespace
fn sanitize_text(text: &str) -> String {
    text.replace('\0', "").trim().to_string()
}

/// First message id in a header value, without angle brackets
fn extract_message_id(header_value: &str) -> Option<String> {
    let value = sanitize_text(header_value);
    let candidate = match get_message_id_regex().captures(&value) {
        Some(caps) => caps.get(1).map(|m| m.as_str().to_string()),
        None => value.split_whitespace().next().map(str::to_string),
    };
    candidate.filter(|id| !id.is_empty())
}

/// Extract message IDs from a References header, oldest first
///
/// Handles both space-separated and run-together (`<a><b>`) lists.
fn extract_references(header_value: &str) -> Vec<String> {
    let value = sanitize_text(header_value);
    let bracketed: Vec<String> = get_message_id_regex()
        .captures_iter(&value)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if !bracketed.is_empty() {
        return bracketed;
    }

    value
        .split_whitespace()
        .map(|id| id.trim_matches(&['<', '>'][..]).to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Read state from the mbox `Status` header, `None` when absent
fn status_header_unread(status: Option<String>) -> Option<bool> {
    status.map(|value| !value.contains('R'))
}

/// Read state from a maildir file name (`...:2,FRS`), `None` when absent
pub fn maildir_unread(file_name: &str) -> Option<bool> {
    file_name
        .rsplit_once(":2,")
        .map(|(_, flags)| !flags.contains('S'))
}

/// Parse a message from raw bytes.
///
/// # Errors
///
/// Fails on unparseable MIME and on a missing, invalid or far-future Date.
/// A missing Message-ID is not an error; the record id stands in for it.
pub fn parse_message(raw: &[u8]) -> Result<MessageRecord, ParseMessageError> {
    let record_id = format!("{:x}", Sha256::digest(raw));

    let parsed = parse_mail(raw).map_err(|e| {
        log::debug!("failed to parse MIME for {}: {}", record_id, e);
        ParseMessageError::MimeParse(e)
    })?;

    let message_id = parsed
        .headers
        .get_first_value("Message-ID")
        .map(|value| sanitize_text(&value))
        .unwrap_or_default();
    if message_id.is_empty() {
        log::debug!("record {} has no Message-ID", record_id);
    }

    let subject = parsed
        .headers
        .get_first_value("Subject")
        .map(|s| sanitize_text(&s))
        .unwrap_or_default();

    let date = parse_message_date(parsed.headers.get_first_value("Date"), &record_id)?;

    let in_reply_to = parsed
        .headers
        .get_first_value("In-Reply-To")
        .and_then(|value| extract_message_id(&value));

    let references = parsed
        .headers
        .get_first_value("References")
        .map(|value| extract_references(&value))
        .unwrap_or_default();

    let is_unread =
        status_header_unread(parsed.headers.get_first_value("Status")).unwrap_or(true);

    log::trace!("parsed: {} - {}", record_id, subject);

    Ok(MessageRecord {
        id: record_id,
        message_id,
        in_reply_to,
        references,
        date,
        subject,
        is_unread,
        thread_id: None,
    })
}

/// Parse a message file, taking read state from maildir flags when present.
pub fn parse_message_file(path: &Path) -> Result<MessageRecord, ParseMessageError> {
    let raw = std::fs::read(path).map_err(|source| ParseMessageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut record = parse_message(&raw)?;

    if let Some(unread) = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(maildir_unread)
    {
        record.is_unread = unread;
    }

    Ok(record)
}

fn parse_message_date(
    raw_date: Option<String>,
    record_id: &str,
) -> Result<DateTime<Utc>, ParseMessageError> {
    let raw = raw_date.unwrap_or_default();
    if raw.trim().is_empty() {
        log::warn!("record {} missing Date header, skipping", record_id);
        return Err(ParseMessageError::MissingDate {
            record_id: record_id.to_string(),
        });
    }

    match dateparser::parse(&raw) {
        Ok(dt) => {
            let utc = dt.with_timezone(&Utc);
            if utc > Utc::now() + MAX_FUTURE_SKEW {
                log::warn!(
                    "record {} has future date `{}` (> {} hours ahead), skipping",
                    record_id,
                    raw,
                    MAX_FUTURE_SKEW.num_hours()
                );
                Err(ParseMessageError::FutureDate {
                    record_id: record_id.to_string(),
                    raw,
                })
            } else {
                Ok(utc)
            }
        }
        Err(source) => {
            log::warn!(
                "record {} has invalid date `{}`, skipping: {}",
                record_id,
                raw,
                source
            );
            Err(ParseMessageError::InvalidDate {
                record_id: record_id.to_string(),
                raw,
                error: source.to_string(),
            })
        }
    }
}
