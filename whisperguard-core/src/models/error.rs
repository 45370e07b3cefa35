use thiserror::Error;

/// Errors that can occur while capturing, framing, or dispatching audio.
///
/// `PermissionDenied` and `DeviceNotAvailable` abort a start attempt.
/// `Teardown` is only ever logged; release steps never propagate it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("device not available")]
    DeviceNotAvailable,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid container: {0}")]
    InvalidContainer(String),

    #[error("teardown step failed: {0}")]
    Teardown(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// Whether this error means the input device could not be acquired.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::DeviceNotAvailable)
    }
}

/// Errors reported by a [`Dispatcher`](crate::traits::dispatcher::Dispatcher).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("analysis service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid analysis parameters: {0}")]
    InvalidParams(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_are_classified() {
        assert!(CaptureError::PermissionDenied.is_device_error());
        assert!(CaptureError::DeviceNotAvailable.is_device_error());
        assert!(!CaptureError::Teardown("x".into()).is_device_error());
    }

    #[test]
    fn dispatch_error_converts_and_keeps_message() {
        let err: CaptureError = DispatchError::Status {
            status: 503,
            body: "busy".into(),
        }
        .into();
        assert_eq!(err.to_string(), "analysis service returned 503: busy");
    }
}
