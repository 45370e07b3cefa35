use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DispatchError;

/// Scalar parameters sent alongside every container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    /// Detection sensitivity in `[0, 1]` (default: 0.5).
    pub sensitivity: f32,

    /// Ask the service to keep evidence even when nothing is detected.
    pub force_save: bool,
}

impl AnalysisParams {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.sensitivity) {
            return Err(format!("sensitivity must be within [0, 1]: {}", self.sensitivity));
        }
        Ok(())
    }
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            sensitivity: 0.5,
            force_save: false,
        }
    }
}

/// Opaque response of the analysis service.
///
/// The schema belongs to the service; only the raw JSON is kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub body: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            body,
            received_at: Utc::now(),
        }
    }

    /// The `evidence` object, present when the service saved the clip.
    pub fn evidence(&self) -> Option<&serde_json::Value> {
        self.body.get("evidence").filter(|v| !v.is_null())
    }
}

/// Outcome of one streamed chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcome {
    pub sequence: u64,
    pub sample_count: usize,
    pub result: Result<AnalysisResult, DispatchError>,
}

impl ChunkOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sensitivity_bounds_are_inclusive() {
        for s in [0.0, 0.5, 1.0] {
            let params = AnalysisParams {
                sensitivity: s,
                force_save: false,
            };
            assert!(params.validate().is_ok());
        }
        let params = AnalysisParams {
            sensitivity: -0.01,
            force_save: true,
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn nan_sensitivity_is_rejected() {
        let params = AnalysisParams {
            sensitivity: f32::NAN,
            force_save: false,
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn evidence_is_optional() {
        let saved = AnalysisResult::new(json!({"level": "Hidden", "evidence": {"audio": "evidence/x/audio.wav"}}));
        assert_eq!(saved.evidence().unwrap()["audio"], "evidence/x/audio.wav");

        let plain = AnalysisResult::new(json!({"level": "Normal", "evidence": null}));
        assert!(plain.evidence().is_none());
    }
}
