//! Per-session aggregate metrics.
//!
//! Everything here is a pure function of stored readings plus config, so
//! summaries can be recomputed at any time under new thresholds. Time-based
//! metrics integrate over consecutive sample intervals and count monitored
//! time only: an interval longer than `max_gap_secs` is a gap and contributes
//! nothing.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::Reading;

use super::{config::AnalysisConfig, desaturation::DesaturationEvent};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Monitored hours: gap time is excluded.
    pub duration_hours: f64,
    pub event_count: usize,
    /// Desaturation events per monitored hour; 0 when nothing was monitored.
    pub odi: f64,
    /// Seconds below each configured threshold, keyed by threshold percent.
    pub time_below_threshold_seconds: BTreeMap<u8, f64>,
    pub min_spo2: Option<u8>,
    pub mean_spo2: Option<f64>,
    pub min_heart_rate: Option<u32>,
    pub mean_heart_rate: Option<f64>,
}

pub fn summarize_session(
    readings: &[Reading],
    events: &[DesaturationEvent],
    config: &AnalysisConfig,
) -> SessionSummary {
    let duration_hours = monitored_seconds(readings, config.max_gap_secs) / 3600.0;
    let odi = if duration_hours > 0.0 {
        events.len() as f64 / duration_hours
    } else {
        0.0
    };

    let mut time_below_threshold_seconds = BTreeMap::new();
    for &threshold in &config.time_below_thresholds {
        time_below_threshold_seconds.insert(
            threshold,
            time_below_threshold(readings, threshold, config.max_gap_secs),
        );
    }

    let spo2_values: Vec<u8> = readings.iter().filter_map(|r| r.spo2).collect();
    let heart_rates: Vec<u32> = readings.iter().filter_map(|r| r.heart_rate).collect();

    SessionSummary {
        duration_hours,
        event_count: events.len(),
        odi,
        time_below_threshold_seconds,
        min_spo2: spo2_values.iter().copied().min(),
        mean_spo2: mean(spo2_values.iter().map(|&v| f64::from(v))),
        min_heart_rate: heart_rates.iter().copied().min(),
        mean_heart_rate: mean(heart_rates.iter().map(|&v| f64::from(v))),
    }
}

/// Total seconds covered by sampling intervals no longer than `max_gap_secs`.
fn monitored_seconds(readings: &[Reading], max_gap_secs: u64) -> f64 {
    readings
        .windows(2)
        .map(|pair| interval_seconds(&pair[0], &pair[1]))
        .filter(|&dt| dt <= max_gap_secs as f64)
        .sum()
}

/// Seconds spent below `threshold`, integrating each sample's coverage up to
/// the next sample. The final sample has no successor and contributes nothing.
fn time_below_threshold(readings: &[Reading], threshold: u8, max_gap_secs: u64) -> f64 {
    readings
        .windows(2)
        .filter(|pair| matches!(pair[0].spo2, Some(value) if value < threshold))
        .map(|pair| interval_seconds(&pair[0], &pair[1]))
        .filter(|&dt| dt <= max_gap_secs as f64)
        .sum()
}

fn interval_seconds(earlier: &Reading, later: &Reading) -> f64 {
    (later.timestamp_utc - earlier.timestamp_utc).num_milliseconds() as f64 / 1000.0
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0u64;
    for value in values {
        sum += value;
        count += 1;
    }
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn base() -> DateTime<Utc> {
        "2024-03-08T04:00:00Z".parse().unwrap()
    }

    fn reading(offset: i64, spo2: Option<u8>, heart_rate: Option<u32>) -> Reading {
        Reading {
            timestamp_utc: base() + Duration::seconds(offset),
            sleep_date: "2024-03-07".parse().unwrap(),
            spo2,
            heart_rate,
            perfusion_index: None,
            movement: None,
            battery: None,
        }
    }

    fn event(start_offset: i64, end_offset: i64) -> DesaturationEvent {
        DesaturationEvent {
            start_ts: base() + Duration::seconds(start_offset),
            end_ts: base() + Duration::seconds(end_offset),
            duration_seconds: end_offset - start_offset,
            min_spo2: 84,
            baseline_spo2: 96,
        }
    }

    fn config(max_gap: u64, thresholds: Vec<u8>) -> AnalysisConfig {
        AnalysisConfig {
            max_gap_secs: max_gap,
            time_below_thresholds: thresholds,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn odi_is_events_per_monitored_hour() {
        // Eight hours sampled once a minute, six events.
        let readings: Vec<Reading> = (0..=480)
            .map(|i| reading(i * 60, Some(95), Some(60)))
            .collect();
        let events: Vec<DesaturationEvent> =
            (0..6).map(|i| event(i * 600, i * 600 + 30)).collect();

        let summary = summarize_session(&readings, &events, &config(60, vec![88]));
        assert!((summary.duration_hours - 8.0).abs() < 1e-9);
        assert_eq!(summary.event_count, 6);
        assert!((summary.odi - 0.75).abs() < 1e-9);
    }

    #[test]
    fn gap_time_is_excluded_from_duration() {
        let readings = vec![
            reading(0, Some(95), None),
            reading(10, Some(95), None),
            reading(20, Some(95), None),
            // 180 s dropout, then two more samples.
            reading(200, Some(95), None),
            reading(210, Some(95), None),
        ];

        let summary = summarize_session(&readings, &[], &config(60, vec![88]));
        assert!((summary.duration_hours - 30.0 / 3600.0).abs() < 1e-9);
    }

    #[test]
    fn zero_monitored_time_yields_zero_odi() {
        let summary = summarize_session(&[], &[event(0, 30)], &config(60, vec![88]));
        assert_eq!(summary.duration_hours, 0.0);
        assert_eq!(summary.odi, 0.0);
    }

    #[test]
    fn time_below_integrates_sample_coverage() {
        let readings = vec![
            reading(0, Some(85), None),
            reading(10, Some(85), None),
            reading(20, Some(85), None),
            reading(30, Some(89), None),
            reading(40, Some(92), None),
        ];

        let summary = summarize_session(&readings, &[], &config(60, vec![88, 90]));
        assert_eq!(summary.time_below_threshold_seconds[&88], 30.0);
        assert_eq!(summary.time_below_threshold_seconds[&90], 40.0);
    }

    #[test]
    fn time_below_skips_gap_intervals() {
        let readings = vec![
            reading(0, Some(85), None),
            // The next sample is beyond the gap; this 200 s stretch does not
            // count as time below.
            reading(200, Some(85), None),
            reading(210, Some(95), None),
        ];

        let summary = summarize_session(&readings, &[], &config(60, vec![88]));
        assert_eq!(summary.time_below_threshold_seconds[&88], 10.0);
    }

    #[test]
    fn vitals_min_and_mean_ignore_absent_values() {
        let readings = vec![
            reading(0, Some(95), Some(60)),
            reading(10, Some(85), None),
            reading(20, Some(90), Some(70)),
            reading(30, None, None),
        ];

        let summary = summarize_session(&readings, &[], &config(60, vec![88]));
        assert_eq!(summary.min_spo2, Some(85));
        assert_eq!(summary.mean_spo2, Some(90.0));
        assert_eq!(summary.min_heart_rate, Some(60));
        assert_eq!(summary.mean_heart_rate, Some(65.0));
    }

    #[test]
    fn empty_session_summary_is_all_absent() {
        let summary = summarize_session(&[], &[], &config(60, vec![88]));
        assert_eq!(summary.event_count, 0);
        assert_eq!(summary.min_spo2, None);
        assert_eq!(summary.mean_spo2, None);
        assert_eq!(summary.time_below_threshold_seconds[&88], 0.0);
    }
}
