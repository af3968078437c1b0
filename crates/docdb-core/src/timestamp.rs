//! Timestamp parsing and canonical rendering for last-modified tokens,
//! time ranges, point-in-time reads and timestamp versions.

use ::time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};
use thiserror::Error as ThisError;

///
/// TimestampError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("invalid timestamp '{input}': expected RFC 3339")]
pub struct TimestampError {
    pub input: String,
}

/// Parse an RFC 3339 timestamp and render it in canonical UTC form.
pub fn canonical_timestamp(input: &str) -> Result<String, TimestampError> {
    let parsed = OffsetDateTime::parse(input.trim(), &Rfc3339).map_err(|_| TimestampError {
        input: input.to_string(),
    })?;

    render(parsed).ok_or_else(|| TimestampError {
        input: input.to_string(),
    })
}

/// Current instant in UTC.
#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Microseconds since the Unix epoch.
#[must_use]
pub fn unix_micros(at: OffsetDateTime) -> i128 {
    at.unix_timestamp_nanos() / 1_000
}

// Truncate to microseconds; the backend timestamp precision is 6.
fn render(at: OffsetDateTime) -> Option<String> {
    let utc = at.to_offset(UtcOffset::UTC);
    let micros = utc.microsecond();
    let truncated = utc.replace_nanosecond(micros * 1_000).ok()?;

    truncated.format(&Rfc3339).ok()
}
