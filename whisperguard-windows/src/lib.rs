//! # whisperguard-windows
//!
//! Windows WASAPI microphone backend for whisperguard-core.
//!
//! Provides:
//! - `WasapiMicInput`: shared-mode capture endpoint implementing `AudioInput`
//! - `DeviceEnumerator`: capture endpoint listing via the MMDevice API
//! - `permissions`: Windows microphone privacy check
//!
//! ## Usage
//! ```ignore
//! use whisperguard_core::{CaptureConfiguration, HttpDispatcher, RecordingController};
//! use whisperguard_windows::WasapiMicInput;
//!
//! let mic = WasapiMicInput::default_device();
//! let mut controller = RecordingController::new(mic, dispatcher, CaptureConfiguration::default());
//! controller.start()?;
//! ```

#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod permissions;
#[cfg(target_os = "windows")]
pub mod wasapi_mic;

#[cfg(target_os = "windows")]
pub use device_enumerator::{list_input_devices, DeviceEnumerator};
#[cfg(target_os = "windows")]
pub use wasapi_mic::WasapiMicInput;
