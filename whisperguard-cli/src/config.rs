use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use whisperguard_core::WhisperGuardConfig;

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub sensitivity: Option<f32>,
    pub force_save: bool,
    pub mic_device: Option<String>,
}

/// Load `path` (or defaults), apply overrides and validate.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<WhisperGuardConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
            parse(&text).with_context(|| format!("invalid config {}", path.display()))?
        }
        None => WhisperGuardConfig::default(),
    };

    if let Some(endpoint) = &overrides.endpoint {
        config.dispatch.endpoint = endpoint.clone();
    }
    if let Some(sensitivity) = overrides.sensitivity {
        config.capture.params.sensitivity = sensitivity;
    }
    if overrides.force_save {
        config.capture.params.force_save = true;
    }
    if overrides.mic_device.is_some() {
        config.capture.mic_device_id = overrides.mic_device.clone();
    }

    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

fn parse(text: &str) -> Result<WhisperGuardConfig> {
    Ok(toml::from_str(text)?)
}

/// `whisperguard.toml` in the working directory, if present.
pub fn default_path() -> Option<PathBuf> {
    let path = PathBuf::from("whisperguard.toml");
    path.is_file().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_toml() {
        let config = parse(
            r#"
            [capture]
            chunk_period_ms = 500

            [capture.params]
            sensitivity = 0.8

            [dispatch]
            endpoint = "http://10.0.0.2:5000"
            "#,
        )
        .unwrap();
        assert_eq!(config.capture.chunk_period_ms, 500);
        assert_eq!(config.capture.block_len, 4096);
        assert_eq!(config.capture.params.sensitivity, 0.8);
        assert_eq!(config.dispatch.endpoint, "http://10.0.0.2:5000");
        assert_eq!(config.dispatch.analyze_path, "/analyze");
    }

    #[test]
    fn overrides_win_over_defaults() {
        let overrides = Overrides {
            endpoint: Some("https://guard.example".into()),
            sensitivity: Some(0.1),
            force_save: true,
            mic_device: Some("usb-mic".into()),
        };
        let config = load(None, &overrides).unwrap();
        assert_eq!(config.dispatch.endpoint, "https://guard.example");
        assert_eq!(config.capture.params.sensitivity, 0.1);
        assert!(config.capture.params.force_save);
        assert_eq!(config.capture.mic_device_id.as_deref(), Some("usb-mic"));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let overrides = Overrides {
            sensitivity: Some(3.0),
            ..Default::default()
        };
        assert!(load(None, &overrides).is_err());
    }
}
