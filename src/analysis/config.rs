use serde::{Deserialize, Serialize};

/// Tunable thresholds for event detection and session summaries. Changing
/// them never touches stored data; every metric is recomputed from readings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// SpO2 below this percent counts toward a desaturation event.
    pub threshold_percent: u8,

    /// Minimum event length; shorter dips are ignored.
    pub min_duration_secs: u64,

    /// Sampling interval above this is a gap: it splits the series and is
    /// excluded from monitored time.
    pub max_gap_secs: u64,

    /// Qualifying intervals closer than this merge into one event.
    pub merge_gap_secs: u64,

    /// Thresholds for the time-below-threshold integrals.
    pub time_below_thresholds: Vec<u8>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threshold_percent: 88,
            min_duration_secs: 10,
            max_gap_secs: 60,
            merge_gap_secs: 10,
            time_below_thresholds: vec![88, 90],
        }
    }
}
