use std::sync::Arc;

use crate::models::audio_models::AudioSource;
use crate::models::error::CaptureError;

/// Callback invoked once per hardware block with mono f32 samples.
///
/// The slice is only valid for the duration of the call; the platform may
/// reuse the underlying buffer as soon as the callback returns.
pub type RawBlockCallback = Arc<dyn Fn(&[f32]) + Send + Sync + 'static>;

/// Minimal platform audio-input surface.
///
/// Implemented by:
/// - `WasapiMicInput` (Windows)
/// - `SyntheticInput` and `ManualInput` (`crate::testing`)
///
/// The three teardown methods are independent release steps. Each must be
/// safe to call in any state, including after a failed `request_input` or
/// `build_graph`, and more than once.
pub trait AudioInput: Send {
    /// Whether a capture device appears to be present.
    fn is_available(&self) -> bool;

    /// Acquire exclusive use of the input device.
    ///
    /// Fails with `PermissionDenied` or `DeviceNotAvailable`.
    fn request_input(&mut self) -> Result<(), CaptureError>;

    /// Start delivering blocks of `block_len` samples to `on_block`.
    ///
    /// The callback fires on the platform's audio thread; keep work minimal.
    fn build_graph(&mut self, block_len: usize, on_block: RawBlockCallback) -> Result<(), CaptureError>;

    /// Live sample rate of the running graph, if known.
    fn sample_rate(&self) -> Option<u32>;

    /// Stop block delivery.
    fn disconnect_graph(&mut self) -> Result<(), CaptureError>;

    /// Stop the underlying hardware stream.
    fn stop_tracks(&mut self) -> Result<(), CaptureError>;

    /// Release the device handle.
    fn release_device(&mut self) -> Result<(), CaptureError>;

    /// Information about the device backing this input.
    fn device_info(&self) -> AudioSource;

    /// Error that ended block delivery after the graph was built.
    ///
    /// Returned once; later calls yield `None` until the next failure.
    fn take_fault(&mut self) -> Option<CaptureError> {
        None
    }
}

impl<T: AudioInput + ?Sized> AudioInput for Box<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn request_input(&mut self) -> Result<(), CaptureError> {
        (**self).request_input()
    }

    fn build_graph(&mut self, block_len: usize, on_block: RawBlockCallback) -> Result<(), CaptureError> {
        (**self).build_graph(block_len, on_block)
    }

    fn sample_rate(&self) -> Option<u32> {
        (**self).sample_rate()
    }

    fn disconnect_graph(&mut self) -> Result<(), CaptureError> {
        (**self).disconnect_graph()
    }

    fn stop_tracks(&mut self) -> Result<(), CaptureError> {
        (**self).stop_tracks()
    }

    fn release_device(&mut self) -> Result<(), CaptureError> {
        (**self).release_device()
    }

    fn device_info(&self) -> AudioSource {
        (**self).device_info()
    }

    fn take_fault(&mut self) -> Option<CaptureError> {
        (**self).take_fault()
    }
}
