//! HTTP dispatcher for the analysis service.
//!
//! Sends each container as a multipart form:
//! ```text
//! POST {endpoint}/analyze
//!   audio       file part (recording.wav | chunk.wav | <upload name>), audio/wav
//!   sensitivity decimal text
//!   force_save  "1", only when set
//! ```

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;

use crate::models::analysis::{AnalysisParams, AnalysisResult};
use crate::models::config::DispatchConfiguration;
use crate::models::container::EncodedContainer;
use crate::models::error::{CaptureError, DispatchError};
use crate::traits::dispatcher::Dispatcher;

/// Blocking HTTP [`Dispatcher`]. Cheap to share behind an `Arc`.
pub struct HttpDispatcher {
    client: Client,
    url: String,
}

impl HttpDispatcher {
    pub fn new(config: &DispatchConfiguration) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: config.analyze_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn build_form(container: &EncodedContainer, params: &AnalysisParams) -> Result<Form, DispatchError> {
    let audio = Part::bytes(container.bytes().to_vec())
        .file_name(container.file_name())
        .mime_str(container.media_type())
        .map_err(|e| DispatchError::InvalidParams(format!("bad media type: {}", e)))?;

    let mut form = Form::new()
        .part("audio", audio)
        .text("sensitivity", params.sensitivity.to_string());
    if params.force_save {
        form = form.text("force_save", "1");
    }
    Ok(form)
}

impl Dispatcher for HttpDispatcher {
    fn submit(&self, container: &EncodedContainer, params: &AnalysisParams) -> Result<AnalysisResult, DispatchError> {
        params.validate().map_err(DispatchError::InvalidParams)?;
        let form = build_form(container, params)?;

        log::debug!(
            "Uploading {} ({} bytes, sha256 {}) to {}",
            container.file_name(),
            container.bytes().len(),
            container.checksum(),
            self.url
        );

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| DispatchError::Transport(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| DispatchError::InvalidResponse(format!("response is not JSON: {}", e)))?;
        Ok(AnalysisResult::new(value))
    }
}
