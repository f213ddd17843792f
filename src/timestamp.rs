//! Published-date normalization.
//!
//! Every stored timestamp uses [`CANONICAL_FORMAT`] in UTC, so plain string
//! comparison in SQL orders rows chronologically.

use chrono::{DateTime, NaiveDateTime, Utc};

pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Normalize a published date against the current wall clock.
///
/// Feed dates reach this point already decoded by feed-rs, which reads the
/// RFC 2822 `pubDate` grammar and the ISO 8601 Atom dates alike. Items with a
/// missing or unreadable date are stamped with the current time.
pub fn normalize(published: Option<DateTime<Utc>>) -> String {
    normalize_at(published, Utc::now())
}

pub fn normalize_at(published: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    format_canonical(published.unwrap_or(now))
}

pub fn format_canonical(dt: DateTime<Utc>) -> String {
    dt.format(CANONICAL_FORMAT).to_string()
}

pub fn parse_canonical(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, CANONICAL_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
