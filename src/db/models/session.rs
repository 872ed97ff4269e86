use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row of the session listing: a sleep date and how many readings
/// carry it. Sessions are implicit — they exist once at least one reading
/// carries the date and are always recomputed from readings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub sleep_date: NaiveDate,
    pub reading_count: u64,
}
