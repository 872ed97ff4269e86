use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Stored key for a timestamp. Microsecond precision keeps the key width
/// fixed so lexicographic order on the TEXT column is chronological order.
pub fn timestamp_key(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    value
        .parse::<NaiveDate>()
        .with_context(|| format!("failed to parse {field}"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn to_opt_u8(value: Option<i64>, field: &str) -> Result<Option<u8>> {
    value
        .map(|v| u8::try_from(v).map_err(|_| anyhow!("{field} out of range: {v}")))
        .transpose()
}

pub fn to_opt_u32(value: Option<i64>, field: &str) -> Result<Option<u32>> {
    value
        .map(|v| u32::try_from(v).map_err(|_| anyhow!("{field} out of range: {v}")))
        .transpose()
}
