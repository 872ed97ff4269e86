//! Desaturation event detection.
//!
//! Scans a session's SpO2 series in timestamp order. Each sample covers the
//! interval up to the next sample; a gap larger than `max_gap_secs` splits
//! the series into independent segments no event may span, and the final
//! sample of a segment covers zero seconds since nothing bounds it. Absent
//! SpO2 values break run continuity without counting as below or above.
//!
//! Detection is deterministic: identical series and config always produce
//! identical events.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::Reading;

use super::config::AnalysisConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesaturationEvent {
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub duration_seconds: i64,
    /// Lowest SpO2 observed inside the (possibly merged) interval.
    pub min_spo2: u8,
    /// SpO2 immediately preceding the interval, or its first value when
    /// nothing precedes it.
    pub baseline_spo2: u8,
}

/// A maximal below-threshold stretch, before merging and duration filtering.
#[derive(Debug, Clone)]
struct Run {
    start_ts: DateTime<Utc>,
    end_ts: DateTime<Utc>,
    min_spo2: u8,
    baseline_spo2: u8,
}

impl Run {
    fn span_seconds(&self) -> i64 {
        (self.end_ts - self.start_ts).num_seconds()
    }
}

/// Detect desaturation events in a timestamp-ordered reading sequence.
/// Returned events are non-overlapping and ordered by start time.
pub fn detect_desaturations(
    readings: &[Reading],
    config: &AnalysisConfig,
) -> Vec<DesaturationEvent> {
    let mut events = Vec::new();

    for segment in split_into_segments(readings, config.max_gap_secs) {
        let runs = below_runs(segment, config.threshold_percent);
        let merged = merge_runs(runs, config.merge_gap_secs);

        events.extend(
            merged
                .into_iter()
                .filter(|run| run.span_seconds() >= config.min_duration_secs as i64)
                .map(|run| DesaturationEvent {
                    start_ts: run.start_ts,
                    end_ts: run.end_ts,
                    duration_seconds: run.span_seconds(),
                    min_spo2: run.min_spo2,
                    baseline_spo2: run.baseline_spo2,
                }),
        );
    }

    events
}

/// Split at sampling gaps larger than `max_gap_secs`.
fn split_into_segments(readings: &[Reading], max_gap_secs: u64) -> Vec<&[Reading]> {
    let mut segments = Vec::new();
    if readings.is_empty() {
        return segments;
    }

    let mut start = 0;
    for i in 1..readings.len() {
        let dt = (readings[i].timestamp_utc - readings[i - 1].timestamp_utc).num_seconds();
        if dt > max_gap_secs as i64 {
            segments.push(&readings[start..i]);
            start = i;
        }
    }
    segments.push(&readings[start..]);
    segments
}

fn below_runs(segment: &[Reading], threshold: u8) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut current: Option<Run> = None;
    let mut last_seen_spo2: Option<u8> = None;

    for (i, reading) in segment.iter().enumerate() {
        // Coverage ends at the next sample; the segment's last sample has no
        // successor and covers nothing.
        let coverage_end = segment
            .get(i + 1)
            .map(|next| next.timestamp_utc)
            .unwrap_or(reading.timestamp_utc);

        match reading.spo2 {
            Some(value) if value < threshold => {
                match &mut current {
                    Some(run) => {
                        run.end_ts = coverage_end;
                        run.min_spo2 = run.min_spo2.min(value);
                    }
                    None => {
                        current = Some(Run {
                            start_ts: reading.timestamp_utc,
                            end_ts: coverage_end,
                            min_spo2: value,
                            baseline_spo2: last_seen_spo2.unwrap_or(value),
                        });
                    }
                }
                last_seen_spo2 = Some(value);
            }
            Some(value) => {
                if let Some(run) = current.take() {
                    runs.push(run);
                }
                last_seen_spo2 = Some(value);
            }
            None => {
                if let Some(run) = current.take() {
                    runs.push(run);
                }
            }
        }
    }

    if let Some(run) = current.take() {
        runs.push(run);
    }
    runs
}

/// Collapse runs separated by less than `merge_gap_secs` so rapid bursts
/// count once. The minimum-duration check runs after merging.
fn merge_runs(runs: Vec<Run>, merge_gap_secs: u64) -> Vec<Run> {
    let mut merged: Vec<Run> = Vec::new();

    for run in runs {
        match merged.last_mut() {
            Some(prev)
                if (run.start_ts - prev.end_ts).num_seconds() < merge_gap_secs as i64 =>
            {
                prev.end_ts = run.end_ts;
                prev.min_spo2 = prev.min_spo2.min(run.min_spo2);
            }
            _ => merged.push(run),
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base() -> DateTime<Utc> {
        "2024-03-08T04:00:00Z".parse().unwrap()
    }

    fn series(samples: &[(i64, Option<u8>)]) -> Vec<Reading> {
        samples
            .iter()
            .map(|(offset, spo2)| Reading {
                timestamp_utc: base() + Duration::seconds(*offset),
                sleep_date: "2024-03-07".parse().unwrap(),
                spo2: *spo2,
                heart_rate: Some(60),
                perfusion_index: None,
                movement: None,
                battery: None,
            })
            .collect()
    }

    fn config(threshold: u8, min_duration: u64, max_gap: u64, merge_gap: u64) -> AnalysisConfig {
        AnalysisConfig {
            threshold_percent: threshold,
            min_duration_secs: min_duration,
            max_gap_secs: max_gap,
            merge_gap_secs: merge_gap,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn sustained_drop_yields_one_event() {
        // 96% baseline, 84% for 45 seconds, recovery at 96%.
        let mut samples = vec![(0, Some(96))];
        samples.extend((1..=9).map(|i| (i * 5, Some(84))));
        samples.push((50, Some(96)));
        let readings = series(&samples);

        let events = detect_desaturations(&readings, &config(88, 10, 60, 10));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration_seconds, 45);
        assert_eq!(events[0].min_spo2, 84);
        assert_eq!(events[0].baseline_spo2, 96);
        assert_eq!(events[0].start_ts, base() + Duration::seconds(5));
        assert_eq!(events[0].end_ts, base() + Duration::seconds(50));
    }

    #[test]
    fn short_dip_is_ignored() {
        let readings = series(&[(0, Some(96)), (5, Some(84)), (10, Some(96))]);
        let events = detect_desaturations(&readings, &config(88, 10, 60, 10));
        assert!(events.is_empty());
    }

    #[test]
    fn nearby_bursts_merge_into_one_event() {
        let readings = series(&[
            (0, Some(96)),
            (5, Some(84)),
            (10, Some(85)),
            (15, Some(96)),
            (20, Some(83)),
            (25, Some(84)),
            (30, Some(96)),
        ]);

        // Runs cover 5..15 and 20..30; the 5 s recovery between them is
        // shorter than the merge gap.
        let events = detect_desaturations(&readings, &config(88, 20, 60, 10));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_ts, base() + Duration::seconds(5));
        assert_eq!(events[0].end_ts, base() + Duration::seconds(30));
        assert_eq!(events[0].duration_seconds, 25);
        assert_eq!(events[0].min_spo2, 83);
        assert_eq!(events[0].baseline_spo2, 96);
    }

    #[test]
    fn without_merging_the_same_bursts_fail_the_duration_check() {
        let readings = series(&[
            (0, Some(96)),
            (5, Some(84)),
            (10, Some(85)),
            (15, Some(96)),
            (20, Some(83)),
            (25, Some(84)),
            (30, Some(96)),
        ]);

        let events = detect_desaturations(&readings, &config(88, 20, 60, 0));
        assert!(events.is_empty());
    }

    #[test]
    fn events_never_span_a_sampling_gap() {
        let readings = series(&[
            (0, Some(84)),
            (5, Some(84)),
            (10, Some(84)),
            (130, Some(84)),
            (135, Some(84)),
            (140, Some(84)),
        ]);

        let events = detect_desaturations(&readings, &config(88, 10, 60, 10));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start_ts, base());
        assert_eq!(events[0].end_ts, base() + Duration::seconds(10));
        assert_eq!(events[1].start_ts, base() + Duration::seconds(130));
        assert_eq!(events[1].end_ts, base() + Duration::seconds(140));
    }

    #[test]
    fn absent_spo2_breaks_continuity() {
        let readings = series(&[
            (0, Some(84)),
            (5, None),
            (10, Some(84)),
            (15, Some(96)),
        ]);

        let events = detect_desaturations(&readings, &config(88, 5, 60, 0));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].end_ts, base() + Duration::seconds(5));
        assert_eq!(events[1].start_ts, base() + Duration::seconds(10));
    }

    #[test]
    fn baseline_falls_back_to_first_value() {
        // The series opens already below threshold; nothing precedes it.
        let readings = series(&[(0, Some(84)), (5, Some(83)), (10, Some(96))]);
        let events = detect_desaturations(&readings, &config(88, 10, 60, 0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].baseline_spo2, 84);
    }

    #[test]
    fn detection_is_deterministic() {
        let readings = series(&[
            (0, Some(96)),
            (5, Some(84)),
            (10, None),
            (15, Some(85)),
            (200, Some(82)),
            (205, Some(96)),
        ]);
        let config = config(88, 5, 60, 10);

        let first = detect_desaturations(&readings, &config);
        for _ in 0..5 {
            assert_eq!(detect_desaturations(&readings, &config), first);
        }
    }

    #[test]
    fn empty_series_yields_no_events() {
        assert!(detect_desaturations(&[], &config(88, 10, 60, 10)).is_empty());
    }
}
