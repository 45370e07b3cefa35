use std::time::Duration;

use serde::Deserialize;

use super::analysis::AnalysisParams;

/// Capture and framing configuration shared by both controllers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Samples per hardware block delivered to the session (default: 4096).
    pub block_len: usize,

    /// Period of the chunk timer in continuous mode, in milliseconds (default: 1000).
    pub chunk_period_ms: u64,

    /// Rate used when the live session cannot report one (default: 44100).
    pub fallback_sample_rate: u32,

    /// Specific microphone device ID, or None for system default.
    pub mic_device_id: Option<String>,

    /// Parameters sent along with every container.
    pub params: AnalysisParams,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.block_len == 0 {
            return Err("block length must be positive".into());
        }
        if self.chunk_period_ms == 0 {
            return Err("chunk period must be positive".into());
        }
        if self.fallback_sample_rate == 0 {
            return Err("fallback sample rate must be positive".into());
        }
        self.params.validate()
    }

    pub fn chunk_period(&self) -> Duration {
        Duration::from_millis(self.chunk_period_ms)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            block_len: 4096,
            chunk_period_ms: 1000,
            fallback_sample_rate: 44100,
            mic_device_id: None,
            params: AnalysisParams::default(),
        }
    }
}

/// Where and how containers are submitted for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfiguration {
    /// Base URL of the analysis service (default: `http://127.0.0.1:5000`).
    pub endpoint: String,

    /// Path of the analyze route (default: `/analyze`).
    pub analyze_path: String,

    /// Per-request timeout in seconds (default: 30).
    pub timeout_secs: u64,
}

impl DispatchConfiguration {
    pub fn analyze_url(&self) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.analyze_path.trim_start_matches('/')
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(format!("endpoint must be an http(s) URL: {}", self.endpoint));
        }
        if self.timeout_secs == 0 {
            return Err("timeout must be positive".into());
        }
        Ok(())
    }
}

impl Default for DispatchConfiguration {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000".into(),
            analyze_path: "/analyze".into(),
            timeout_secs: 30,
        }
    }
}

/// Top-level configuration, as loaded from a TOML file.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct WhisperGuardConfig {
    pub capture: CaptureConfiguration,
    pub dispatch: DispatchConfiguration,
}

impl WhisperGuardConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.capture.validate()?;
        self.dispatch.validate()
    }
}
