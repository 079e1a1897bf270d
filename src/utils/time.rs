use serde::Serializer;
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// The current instant in UTC.
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Parse an ISO-8601 timestamp.
///
/// RFC 3339 strings are accepted as-is; other ISO-8601 forms with an offset are
/// accepted too, and a timestamp without an offset is taken to be UTC.
pub fn parse_iso8601(s: &str) -> Option<OffsetDateTime> {
    let s = s.trim();
    if let Ok(datetime) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(datetime);
    }
    if let Ok(datetime) = OffsetDateTime::parse(s, &Iso8601::DEFAULT) {
        return Some(datetime);
    }
    PrimitiveDateTime::parse(s, &Iso8601::DEFAULT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Format a timestamp as RFC 3339.
pub fn format_rfc3339(datetime: OffsetDateTime) -> String {
    datetime
        .format(&Rfc3339)
        .unwrap_or_else(|_| datetime.to_string())
}

/// Format a timestamp in UTC at minute resolution, e.g. `2024-05-01 12:30 UTC`.
pub fn format_minute_utc(datetime: OffsetDateTime) -> String {
    let utc = datetime.to_offset(UtcOffset::UTC);
    let formatted = utc
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| utc.to_string());
    format!("{formatted} UTC")
}

/// Format the UTC calendar date, e.g. `2024-05-01`.
pub fn format_date_utc(datetime: OffsetDateTime) -> String {
    let utc = datetime.to_offset(UtcOffset::UTC);
    utc.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| utc.date().to_string())
}

/// Serialize an OffsetDateTime as RFC 3339, for `#[serde(serialize_with)]`.
pub fn serialize_rfc3339<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = datetime
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&s)
}
