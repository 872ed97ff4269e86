//! Read-only query surface over persisted sessions.
//!
//! Side-effect free; any number of sessions can be loaded concurrently. Gaps
//! in the sampling are surfaced to callers, never interpolated away.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::db::{Database, Reading, SessionInfo};

/// A stretch between consecutive readings longer than the configured maximum
/// sampling interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapInterval {
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub duration_seconds: i64,
}

#[derive(Clone)]
pub struct SessionStore {
    db: Database,
    max_gap_secs: u64,
}

impl SessionStore {
    pub fn new(db: Database, max_gap_secs: u64) -> Self {
        Self { db, max_gap_secs }
    }

    /// Distinct sleep dates with reading counts, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        self.db.list_sessions().await
    }

    /// Full ordered reading sequence for one sleep date.
    pub async fn load_session(&self, date: NaiveDate) -> Result<Vec<Reading>> {
        self.db.load_session(date).await
    }

    /// Ordered readings plus the sampling gaps between them.
    pub async fn load_series(
        &self,
        date: NaiveDate,
    ) -> Result<(Vec<Reading>, Vec<GapInterval>)> {
        let readings = self.db.load_session(date).await?;
        let gaps = find_gaps(&readings, self.max_gap_secs);
        Ok((readings, gaps))
    }
}

/// Gaps between consecutive readings exceeding `max_gap_secs`.
pub fn find_gaps(readings: &[Reading], max_gap_secs: u64) -> Vec<GapInterval> {
    readings
        .windows(2)
        .filter_map(|pair| {
            let duration_seconds =
                (pair[1].timestamp_utc - pair[0].timestamp_utc).num_seconds();
            (duration_seconds > max_gap_secs as i64).then(|| GapInterval {
                start_ts: pair[0].timestamp_utc,
                end_ts: pair[1].timestamp_utc,
                duration_seconds,
            })
        })
        .collect()
}
