//! Linear per-channel amplitude calibration.
//!
//! mvme stores the calibration of an amplitude spectrum as a `(min, max)`
//! pair per channel: the full 16-bit ADC range maps linearly onto
//! `[min, max)`, i.e. `energy = m * adc + b` with `m = (max - min) / 65536`
//! and `b = min`.

use crate::types::CHANNELS_PER_BANK;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Number of ADC bins spanned by one calibration.
pub const ADC_RANGE: f64 = 65536.0;

/// Operator class mvme uses for min/max calibrations.
const MIN_MAX_OPERATOR: &str = "CalibrationMinMax";

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid analysis JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no min/max calibration found in analysis")]
    NotFound,
}

/// `energy = slope * adc + intercept` for one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCalibration {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearCalibration {
    pub fn from_min_max(min: f64, max: f64) -> Self {
        Self {
            slope: (max - min) / ADC_RANGE,
            intercept: min,
        }
    }

    #[inline]
    pub fn apply(&self, value: u16) -> f64 {
        self.slope * value as f64 + self.intercept
    }
}

impl Default for LinearCalibration {
    fn default() -> Self {
        Self::from_min_max(0.0, ADC_RANGE)
    }
}

/// Calibration of all amplitude channels of one module.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Calibration {
    channels: [LinearCalibration; CHANNELS_PER_BANK],
}

impl Calibration {
    /// Identity calibration: energy equals the ADC value.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Builds a calibration from per-channel `(min, max)` pairs. Channels
    /// without a pair keep the identity.
    pub fn from_min_max(pairs: &[(f64, f64)]) -> Self {
        let mut calibration = Self::identity();
        for (slot, &(min, max)) in calibration.channels.iter_mut().zip(pairs) {
            *slot = LinearCalibration::from_min_max(min, max);
        }
        calibration
    }

    /// Calibration of `channel` (0-15).
    #[inline]
    pub fn channel(&self, channel: usize) -> &LinearCalibration {
        &self.channels[channel % CHANNELS_PER_BANK]
    }

    #[inline]
    pub fn energy(&self, channel: usize, value: u16) -> f64 {
        self.channel(channel).apply(value)
    }

    /// Reads the calibration from an mvme `analysis.analysis` file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let text = fs::read_to_string(path)?;
        Self::from_analysis_json(&text)
    }

    /// Extracts the min/max calibration from mvme analysis JSON.
    ///
    /// The calibration operator carries a `calibrations` array of
    /// `{"unitMin": .., "unitMax": ..}` objects, one per channel. When the
    /// analysis holds several, the one whose name mentions "amplitude" wins.
    pub fn from_analysis_json(text: &str) -> Result<Self, CalibrationError> {
        let root: Value = serde_json::from_str(text)?;
        let mut candidates = Vec::new();
        collect_min_max(&root, false, None, &mut candidates);

        let chosen = candidates
            .iter()
            .find(|(name, _)| name.is_some_and(|n| n.contains("amplitude")))
            .or_else(|| candidates.first())
            .ok_or(CalibrationError::NotFound)?;
        Ok(Self::from_min_max(&chosen.1))
    }
}

type Candidate<'a> = (Option<&'a str>, Vec<(f64, f64)>);

fn collect_min_max<'a>(
    value: &'a Value,
    inside_operator: bool,
    name: Option<&'a str>,
    out: &mut Vec<Candidate<'a>>,
) {
    match value {
        Value::Object(map) => {
            let inside = inside_operator || names_min_max_operator(map);
            let name = map.get("name").and_then(Value::as_str).or(name);

            if inside {
                if let Some(Value::Array(entries)) = map.get("calibrations") {
                    out.push((name, entries.iter().map(min_max_of).collect()));
                }
            }
            for child in map.values() {
                collect_min_max(child, inside, name, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_min_max(item, inside_operator, name, out);
            }
        }
        _ => {}
    }
}

fn names_min_max_operator(map: &Map<String, Value>) -> bool {
    map.values()
        .any(|v| v.as_str().is_some_and(|s| s.contains(MIN_MAX_OPERATOR)))
}

fn min_max_of(entry: &Value) -> (f64, f64) {
    let min = entry.get("unitMin").and_then(Value::as_f64).unwrap_or(0.0);
    let max = entry
        .get("unitMax")
        .and_then(Value::as_f64)
        .unwrap_or(ADC_RANGE);
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_from_min_max() {
        let cal = LinearCalibration::from_min_max(100.0, 100.0 + 65536.0 * 2.0);
        assert_eq!(cal.slope, 2.0);
        assert_eq!(cal.intercept, 100.0);
        assert_eq!(cal.apply(10), 120.0);
    }

    #[test]
    fn test_default_is_identity() {
        let cal = Calibration::identity();
        for chn in 0..CHANNELS_PER_BANK {
            assert_eq!(cal.energy(chn, 1234), 1234.0);
        }
    }

    #[test]
    fn test_partial_pairs_keep_identity() {
        let cal = Calibration::from_min_max(&[(0.0, 6553.6)]);
        assert!((cal.energy(0, 1000) - 100.0).abs() < 1e-9);
        assert_eq!(cal.energy(1, 1000), 1000.0);
    }

    #[test]
    fn test_from_analysis_json_prefers_amplitude() {
        let json = r#"{
            "AnalysisNG": {
                "operators": [
                    {
                        "class": "analysis::CalibrationMinMax",
                        "name": "tdc_cal",
                        "data": { "calibrations": [ { "unitMin": 5, "unitMax": 10 } ] }
                    },
                    {
                        "class": "analysis::CalibrationMinMax",
                        "name": "amplitude_cal",
                        "data": {
                            "calibrations": [
                                { "unitMin": 0, "unitMax": 655.36 },
                                { "unitMin": 10, "unitMax": 65546 }
                            ]
                        }
                    }
                ]
            }
        }"#;
        let cal = Calibration::from_analysis_json(json).unwrap();
        assert!((cal.energy(0, 100) - 1.0).abs() < 1e-9);
        assert!((cal.energy(1, 100) - 110.0).abs() < 1e-9);
        assert_eq!(cal.energy(2, 100), 100.0);
    }

    #[test]
    fn test_from_analysis_json_ignores_other_operators() {
        let json = r#"{ "operators": [ { "class": "analysis::Histo1DSink",
                        "calibrations": [ { "unitMin": 1, "unitMax": 2 } ] } ] }"#;
        assert!(matches!(
            Calibration::from_analysis_json(json),
            Err(CalibrationError::NotFound)
        ));
        assert!(matches!(
            Calibration::from_analysis_json("not json"),
            Err(CalibrationError::Json(_))
        ));
    }
}
