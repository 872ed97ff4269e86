//! Normalizes raw acquisition output into validated samples.
//!
//! The BLE relay prints one record per line in its verbose format:
//!
//! ```text
//! SpO2: 98%	HR: 61 bpm	PI: 7	Movement: 2	Battery: 85%
//! ```
//!
//! Interleaved with telemetry are discovery chatter, calibration notices and
//! battery-only frames; those are rejections, not stream errors. Parsing is
//! pure: no I/O, no clock, deterministic for a given line.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    /// The line is not a telemetry record, or a value token is non-numeric.
    #[error("unrecognized telemetry line: {0}")]
    Parse(String),
    /// Numeric but outside the declared physiological range. One bad field
    /// invalidates the whole record.
    #[error("{field} out of range: {value}")]
    Validation { field: &'static str, value: String },
}

/// Field values lifted off one telemetry line. Absent fields are `None`,
/// never zero-filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSample {
    pub spo2: Option<u8>,
    pub heart_rate: Option<u32>,
    pub perfusion_index: Option<f64>,
    pub movement: Option<f64>,
    pub battery: Option<u8>,
}

/// Parse one raw line into a validated sample.
///
/// A line qualifies as telemetry when it carries at least one vital sign
/// (SpO2 or HR); anything else is a `Parse` rejection the caller counts and
/// discards.
pub fn parse_line(line: &str) -> Result<RawSample, SampleError> {
    let mut sample = RawSample::default();
    let tokens: Vec<&str> = line.split_whitespace().collect();

    let mut index = 0;
    while index < tokens.len() {
        let label = tokens[index].trim_end_matches(':').to_ascii_lowercase();
        let value = match tokens.get(index + 1) {
            Some(value) => *value,
            None => break,
        };

        match label.as_str() {
            "spo2" => {
                sample.spo2 = Some(parse_percent(value, "spo2")?);
                index += 2;
            }
            "hr" => {
                sample.heart_rate = Some(parse_heart_rate(value)?);
                // Skip the trailing "bpm" unit token when present.
                if tokens.get(index + 2).map(|t| t.eq_ignore_ascii_case("bpm")) == Some(true) {
                    index += 3;
                } else {
                    index += 2;
                }
            }
            "pi" => {
                sample.perfusion_index = Some(parse_perfusion(value)?);
                index += 2;
            }
            "movement" => {
                sample.movement = Some(parse_real(value)?);
                index += 2;
            }
            "battery" => {
                sample.battery = Some(parse_percent(value, "battery")?);
                index += 2;
            }
            _ => index += 1,
        }
    }

    if sample.spo2.is_none() && sample.heart_rate.is_none() {
        return Err(SampleError::Parse(line.trim().to_string()));
    }

    Ok(sample)
}

fn parse_percent(raw: &str, field: &'static str) -> Result<u8, SampleError> {
    let digits = raw.trim_end_matches('%');
    let value: u32 = digits
        .parse()
        .map_err(|_| SampleError::Parse(raw.to_string()))?;
    if value > 100 {
        return Err(SampleError::Validation {
            field,
            value: raw.to_string(),
        });
    }
    Ok(value as u8)
}

fn parse_heart_rate(raw: &str) -> Result<u32, SampleError> {
    let value: u32 = raw
        .parse()
        .map_err(|_| SampleError::Parse(raw.to_string()))?;
    if value == 0 {
        return Err(SampleError::Validation {
            field: "heart_rate",
            value: raw.to_string(),
        });
    }
    Ok(value)
}

fn parse_perfusion(raw: &str) -> Result<f64, SampleError> {
    let value = parse_real(raw)?;
    if value < 0.0 {
        return Err(SampleError::Validation {
            field: "perfusion_index",
            value: raw.to_string(),
        });
    }
    Ok(value)
}

fn parse_real(raw: &str) -> Result<f64, SampleError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| SampleError::Parse(raw.to_string()))?;
    if !value.is_finite() {
        return Err(SampleError::Parse(raw.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verbose_telemetry_line() {
        let sample =
            parse_line("SpO2: 98%\tHR: 61 bpm\tPI: 7\tMovement: 2\tBattery: 85%").unwrap();
        assert_eq!(
            sample,
            RawSample {
                spo2: Some(98),
                heart_rate: Some(61),
                perfusion_index: Some(7.0),
                movement: Some(2.0),
                battery: Some(85),
            }
        );
    }

    #[test]
    fn accepts_spaces_and_mixed_case() {
        let sample = parse_line("spo2: 95% hr: 58 bpm pi: 6 movement: 0 battery: 40%").unwrap();
        assert_eq!(sample.spo2, Some(95));
        assert_eq!(sample.heart_rate, Some(58));
    }

    #[test]
    fn missing_optional_fields_stay_absent() {
        let sample = parse_line("SpO2: 97% HR: 60 bpm").unwrap();
        assert_eq!(sample.perfusion_index, None);
        assert_eq!(sample.movement, None);
        assert_eq!(sample.battery, None);
    }

    #[test]
    fn rejects_device_chatter() {
        let err = parse_line("Discovered device f3:1c:00:aa:bb:cc").unwrap_err();
        assert!(matches!(err, SampleError::Parse(_)));
    }

    #[test]
    fn rejects_battery_only_frame() {
        // Emitted while the device is not being worn; no vital sign present.
        let err = parse_line("Battery: 85%").unwrap_err();
        assert!(matches!(err, SampleError::Parse(_)));
    }

    #[test]
    fn rejects_non_numeric_value() {
        let err = parse_line("SpO2: high% HR: 60 bpm").unwrap_err();
        assert!(matches!(err, SampleError::Parse(_)));
    }

    #[test]
    fn rejects_out_of_range_spo2() {
        let err = parse_line("SpO2: 120% HR: 60 bpm").unwrap_err();
        assert_eq!(
            err,
            SampleError::Validation {
                field: "spo2",
                value: "120%".to_string(),
            }
        );
    }

    #[test]
    fn rejects_zero_heart_rate() {
        let err = parse_line("SpO2: 95% HR: 0 bpm").unwrap_err();
        assert!(matches!(
            err,
            SampleError::Validation {
                field: "heart_rate",
                ..
            }
        ));
    }

    #[test]
    fn one_bad_field_invalidates_whole_record() {
        let err = parse_line("SpO2: 95% HR: 60 bpm Battery: 250%").unwrap_err();
        assert!(matches!(
            err,
            SampleError::Validation { field: "battery", .. }
        ));
    }
}
