//! Windows microphone privacy check.
//!
//! Desktop apps are blocked from the microphone when the user turns off the
//! global toggle under Settings > Privacy > Microphone. There is no consent
//! prompt for unpackaged apps, so the only signal is a failed activation.

use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use whisperguard_core::models::error::CaptureError;

use crate::device_enumerator::ComGuard;

const E_ACCESSDENIED: i32 = -2147024891;
const AUDCLNT_E_DEVICE_IN_USE: i32 = -2004287478;

/// Outcome of probing the default capture endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicAccess {
    Granted,
    Denied,
    NoDevice,
}

impl MicAccess {
    /// Map to the error `request_input` should report, if any.
    pub fn into_result(self) -> Result<(), CaptureError> {
        match self {
            Self::Granted => Ok(()),
            Self::Denied => Err(CaptureError::PermissionDenied),
            Self::NoDevice => Err(CaptureError::DeviceNotAvailable),
        }
    }
}

/// Check microphone access by activating an `IAudioClient` on `device_id`
/// (or the default capture endpoint).
pub fn check_microphone_access(device_id: Option<&str>) -> Result<MicAccess, CaptureError> {
    let _com = ComGuard::init()?;
    unsafe {
        let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
            .map_err(|e| CaptureError::Unknown(format!("failed to create enumerator: {}", e)))?;

        let device = match crate::device_enumerator::resolve_capture_device(&enumerator, device_id) {
            Ok(d) => d,
            Err(_) => return Ok(MicAccess::NoDevice),
        };

        let result: windows::core::Result<IAudioClient> = device.Activate(CLSCTX_ALL, None);
        match result {
            Ok(_) => Ok(MicAccess::Granted),
            Err(e) => {
                let code = e.code().0;
                if code == E_ACCESSDENIED || code == AUDCLNT_E_DEVICE_IN_USE {
                    Ok(MicAccess::Denied)
                } else {
                    log::warn!("Unexpected error probing microphone access: {}", e);
                    Ok(MicAccess::Granted)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_maps_to_capture_errors() {
        assert!(MicAccess::Granted.into_result().is_ok());
        assert_eq!(MicAccess::Denied.into_result(), Err(CaptureError::PermissionDenied));
        assert_eq!(MicAccess::NoDevice.into_result(), Err(CaptureError::DeviceNotAvailable));
    }
}
