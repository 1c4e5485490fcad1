#![forbid(unsafe_code)]

use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

pub(crate) fn now_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub(crate) fn lease_timestamp(ttl_seconds: i64) -> String {
    (OffsetDateTime::now_utc() + Duration::seconds(ttl_seconds))
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub(crate) fn cutoff_timestamp(seconds_ago: i64) -> String {
    (OffsetDateTime::now_utc() - Duration::seconds(seconds_ago))
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub(crate) fn timestamp_is_future(value: &str) -> bool {
    match OffsetDateTime::parse(value, &Rfc3339) {
        Ok(parsed) => parsed > OffsetDateTime::now_utc(),
        Err(_) => false,
    }
}

/// Empty or whitespace-only text maps to SQL NULL.
pub(crate) fn nullable_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}
