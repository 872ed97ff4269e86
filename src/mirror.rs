//! Flat-file mirror of the readings store.
//!
//! One CSV per sleep date, fixed header, append-only. The SQLite store is the
//! durability source of truth; the mirror is best-effort and can always be
//! rebuilt from stored readings for a date.

use std::{
    fs::{self, OpenOptions},
    io::Write as _,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;

use crate::db::{timestamp_key, Reading};

pub const MIRROR_HEADER: &str = "timestamp_utc,spo2,heart_rate,perfusion_index,movement,battery";

#[derive(Debug, Clone)]
pub struct Mirror {
    dir: PathBuf,
}

impl Mirror {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create mirror directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Deterministic file name for a sleep date.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("oximon_{}.csv", date.format("%Y%m%d")))
    }

    /// Append one reading to its date's file, writing the header first if the
    /// file is new. Callers only append readings the primary store accepted,
    /// so redelivered data never reaches the mirror twice.
    pub fn append(&self, reading: &Reading) -> Result<()> {
        let path = self.path_for(reading.sleep_date);
        let header_needed = !path.exists();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open mirror file {}", path.display()))?;

        if header_needed {
            writeln!(file, "{MIRROR_HEADER}")?;
        }
        writeln!(file, "{}", format_row(reading))?;
        file.flush()?;
        Ok(())
    }

    /// Rewrite a date's file from the primary store. Used to reconcile after
    /// a crash between the store write and the mirror write.
    pub fn rebuild(&self, date: NaiveDate, readings: &[Reading]) -> Result<()> {
        let path = self.path_for(date);
        let mut contents = String::with_capacity((readings.len() + 1) * 64);
        contents.push_str(MIRROR_HEADER);
        contents.push('\n');
        for reading in readings {
            contents.push_str(&format_row(reading));
            contents.push('\n');
        }
        fs::write(&path, contents)
            .with_context(|| format!("failed to rewrite mirror file {}", path.display()))
    }

    /// Re-parse a date's mirror file. Rows come back as full readings with
    /// the file's sleep date attached.
    pub fn read_back(&self, date: NaiveDate) -> Result<Vec<Reading>> {
        let path = self.path_for(date);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read mirror file {}", path.display()))?;

        let mut lines = contents.lines();
        match lines.next() {
            Some(header) if header == MIRROR_HEADER => {}
            other => {
                return Err(anyhow!(
                    "mirror file {} has unexpected header: {:?}",
                    path.display(),
                    other
                ))
            }
        }

        lines
            .filter(|line| !line.is_empty())
            .map(|line| parse_row(line, date, &path))
            .collect()
    }
}

fn format_row(reading: &Reading) -> String {
    fn cell<T: std::fmt::Display>(value: &Option<T>) -> String {
        value.as_ref().map(T::to_string).unwrap_or_default()
    }

    format!(
        "{},{},{},{},{},{}",
        timestamp_key(reading.timestamp_utc),
        cell(&reading.spo2),
        cell(&reading.heart_rate),
        cell(&reading.perfusion_index),
        cell(&reading.movement),
        cell(&reading.battery),
    )
}

fn parse_row(line: &str, date: NaiveDate, path: &Path) -> Result<Reading> {
    fn cell<T: std::str::FromStr>(raw: &str, field: &str) -> Result<Option<T>> {
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("invalid {field} value '{raw}'"))
    }

    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 6 {
        return Err(anyhow!(
            "mirror row in {} has {} fields, expected 6",
            path.display(),
            fields.len()
        ));
    }

    Ok(Reading {
        timestamp_utc: chrono::DateTime::parse_from_rfc3339(fields[0])
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .with_context(|| format!("invalid timestamp in {}", path.display()))?,
        sleep_date: date,
        spo2: cell(fields[1], "spo2")?,
        heart_rate: cell(fields[2], "heart_rate")?,
        perfusion_index: cell(fields[3], "perfusion_index")?,
        movement: cell(fields[4], "movement")?,
        battery: cell(fields[5], "battery")?,
    })
}
