//! Reading data model.
//!
//! One validated sensor observation from the pulse oximeter. `timestamp_utc`
//! is the sole natural key; at most one stored reading exists per instant.
//! Readings are immutable once persisted: append-only, never updated, never
//! deleted by this crate.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp_utc: DateTime<Utc>,
    /// Assigned once at ingest from `(timestamp_utc, timezone)` and stored;
    /// never recomputed retroactively.
    pub sleep_date: NaiveDate,
    /// Oxygen saturation percent, 0-100. Absent when the device reported
    /// nothing, never zero-filled.
    pub spo2: Option<u8>,
    pub heart_rate: Option<u32>,
    pub perfusion_index: Option<f64>,
    pub movement: Option<f64>,
    pub battery: Option<u8>,
}

impl Reading {
    /// Wall-clock time of this reading in the configured timezone.
    pub fn local_time(&self, tz: Tz) -> DateTime<Tz> {
        self.timestamp_utc.with_timezone(&tz)
    }
}
