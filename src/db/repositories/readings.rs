use anyhow::Result;
use rusqlite::params;

use crate::db::{connection::Database, helpers::timestamp_key, models::Reading};

impl Database {
    /// Insert a reading, treating a duplicate `timestamp_utc` as a success
    /// no-op. Returns whether a row was actually written, so the caller can
    /// skip the mirror append on redelivered data.
    pub async fn insert_reading(&self, reading: &Reading) -> Result<bool> {
        let record = reading.clone();
        self.execute(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO readings (
                    timestamp_utc,
                    sleep_date,
                    spo2,
                    heart_rate,
                    perfusion_index,
                    movement,
                    battery
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    timestamp_key(record.timestamp_utc),
                    record.sleep_date.to_string(),
                    record.spo2.map(i64::from),
                    record.heart_rate.map(i64::from),
                    record.perfusion_index,
                    record.movement,
                    record.battery.map(i64::from),
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
    }
}
