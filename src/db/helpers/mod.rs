use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::db::models::AppointmentStatus;

/// Fixed-width UTC text, so SQL `ORDER BY` on the column is chronological.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_status(value: &str) -> Result<AppointmentStatus> {
    match value {
        "pending" => Ok(AppointmentStatus::Pending),
        "synced" => Ok(AppointmentStatus::Synced),
        other => Err(anyhow!("unknown appointment status {other}")),
    }
}

pub fn to_u16(value: i64, field: &str) -> Result<u16> {
    u16::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

pub fn encode_headers(headers: &BTreeMap<String, String>) -> Result<String> {
    serde_json::to_string(headers).context("failed to encode headers")
}

pub fn decode_headers(raw: &str) -> Result<BTreeMap<String, String>> {
    serde_json::from_str(raw).context("failed to decode stored headers")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_rejects_unknown() {
        assert_eq!(parse_status("pending").unwrap(), AppointmentStatus::Pending);
        assert_eq!(parse_status("synced").unwrap(), AppointmentStatus::Synced);
        assert!(parse_status("Synced").is_err());
    }

    #[test]
    fn test_format_datetime_is_fixed_width() {
        let whole = DateTime::parse_from_rfc3339("2025-03-15T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let fraction = whole + chrono::Duration::nanoseconds(123_456_789);

        assert_eq!(format_datetime(&whole), "2025-03-15T09:30:00.000000Z");
        assert_eq!(format_datetime(&fraction), "2025-03-15T09:30:00.123456Z");
        assert!(format_datetime(&whole) < format_datetime(&fraction));
        assert_eq!(
            parse_datetime(&format_datetime(&fraction), "cached_at").unwrap(),
            whole + chrono::Duration::microseconds(123_456)
        );
    }

    #[test]
    fn test_to_u16_bounds() {
        assert_eq!(to_u16(408, "status").unwrap(), 408);
        assert!(to_u16(-1, "status").is_err());
        assert!(to_u16(70_000, "status").is_err());
    }
}
