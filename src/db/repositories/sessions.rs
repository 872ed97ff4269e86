use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_date, parse_datetime, to_opt_u32, to_opt_u8, to_u64},
    models::{Reading, SessionInfo},
};

fn row_to_reading(row: &Row) -> Result<Reading> {
    let timestamp_utc: String = row.get("timestamp_utc")?;
    let sleep_date: String = row.get("sleep_date")?;
    let spo2: Option<i64> = row.get("spo2")?;
    let heart_rate: Option<i64> = row.get("heart_rate")?;

    Ok(Reading {
        timestamp_utc: parse_datetime(&timestamp_utc, "timestamp_utc")?,
        sleep_date: parse_date(&sleep_date, "sleep_date")?,
        spo2: to_opt_u8(spo2, "spo2")?,
        heart_rate: to_opt_u32(heart_rate, "heart_rate")?,
        perfusion_index: row.get("perfusion_index")?,
        movement: row.get("movement")?,
        battery: to_opt_u8(row.get("battery")?, "battery")?,
    })
}

impl Database {
    /// Distinct sleep dates with reading counts, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sleep_date, COUNT(*) AS reading_count
                 FROM readings
                 GROUP BY sleep_date
                 ORDER BY sleep_date DESC",
            )?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                let sleep_date: String = row.get(0)?;
                let reading_count: i64 = row.get(1)?;
                sessions.push(SessionInfo {
                    sleep_date: parse_date(&sleep_date, "sleep_date")?,
                    reading_count: to_u64(reading_count, "reading_count")?,
                });
            }

            Ok(sessions)
        })
        .await
    }

    /// All readings for one sleep date, ascending by timestamp.
    pub async fn load_session(&self, date: NaiveDate) -> Result<Vec<Reading>> {
        let date = date.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp_utc, sleep_date, spo2, heart_rate,
                        perfusion_index, movement, battery
                 FROM readings
                 WHERE sleep_date = ?1
                 ORDER BY timestamp_utc ASC",
            )?;

            let mut rows = stmt.query(params![date])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(row_to_reading(row)?);
            }

            Ok(readings)
        })
        .await
    }
}
