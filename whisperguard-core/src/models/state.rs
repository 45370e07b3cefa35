use std::fmt;

use super::error::CaptureError;

/// Controller state machine.
///
/// One-shot mode:
/// ```text
/// idle → recording → stopping → idle
///                        ↓
///                      error
/// ```
///
/// Streaming mode:
/// ```text
/// idle → continuous → idle
///            ↓
///          error
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Stopping,
    Continuous,
    Error(CaptureError),
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether a capture session is (or may still be) holding the device.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Stopping | Self::Continuous)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// States from which `start` is accepted.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Error(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Continuous => "continuous",
            Self::Error(_) => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "error: {}", e),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_partition_states() {
        let error = SessionState::Error(CaptureError::DeviceNotAvailable);
        for state in [SessionState::Recording, SessionState::Stopping, SessionState::Continuous] {
            assert!(state.is_active(), "{} should hold the device", state);
            assert!(!state.can_start());
        }
        assert!(!SessionState::Idle.is_active());
        assert!(!error.is_active());
        assert!(error.is_error());
        assert!(error.can_start());
        assert!(SessionState::default().is_idle());
    }

    #[test]
    fn display_includes_error_detail() {
        assert_eq!(SessionState::Continuous.to_string(), "continuous");
        let state = SessionState::Error(CaptureError::InvalidState("busy".into()));
        assert!(state.to_string().starts_with("error: "));
        assert!(state.to_string().contains("busy"));
    }
}
