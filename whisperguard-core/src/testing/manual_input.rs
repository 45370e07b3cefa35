use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioSource, AudioTransportType};
use crate::models::error::CaptureError;
use crate::traits::audio_input::{AudioInput, RawBlockCallback};

/// How often each boundary method was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputCounts {
    pub requests: u32,
    pub builds: u32,
    pub disconnects: u32,
    pub track_stops: u32,
    pub releases: u32,
}

#[derive(Default)]
struct ManualState {
    configured_rate: u32,
    live_rate: Option<u32>,
    acquired: bool,
    callback: Option<RawBlockCallback>,
    fail_request: Option<CaptureError>,
    fail_build: Option<CaptureError>,
    fail_disconnect: bool,
    fault: Option<CaptureError>,
    counts: InputCounts,
}

/// An [`AudioInput`] whose blocks are pushed by hand.
///
/// Clones share state: keep one clone to push blocks and script failures
/// while a controller owns the other.
#[derive(Clone)]
pub struct ManualInput {
    state: Arc<Mutex<ManualState>>,
}

impl ManualInput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                configured_rate: sample_rate,
                ..Default::default()
            })),
        }
    }

    /// Deliver one block through the registered graph callback.
    ///
    /// Returns `false` when no graph is connected.
    pub fn push(&self, samples: &[f32]) -> bool {
        let callback = self.state.lock().callback.clone();
        match callback {
            Some(cb) => {
                cb(samples);
                true
            }
            None => false,
        }
    }

    /// Change the rate reported now (if running) and on the next build.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        let mut s = self.state.lock();
        s.configured_rate = sample_rate;
        if s.live_rate.is_some() {
            s.live_rate = Some(sample_rate);
        }
    }

    pub fn fail_next_request(&self, error: CaptureError) {
        self.state.lock().fail_request = Some(error);
    }

    pub fn fail_next_build(&self, error: CaptureError) {
        self.state.lock().fail_build = Some(error);
    }

    /// Make every `disconnect_graph` report failure (after disconnecting).
    pub fn fail_disconnect(&self, fail: bool) {
        self.state.lock().fail_disconnect = fail;
    }

    /// Simulate the device dying mid-stream: delivery stops and `error`
    /// is reported through `take_fault`.
    pub fn fail_device(&self, error: CaptureError) {
        let mut s = self.state.lock();
        s.callback = None;
        s.live_rate = None;
        s.fault = Some(error);
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().callback.is_some()
    }

    pub fn is_acquired(&self) -> bool {
        self.state.lock().acquired
    }

    pub fn counts(&self) -> InputCounts {
        self.state.lock().counts
    }
}

impl AudioInput for ManualInput {
    fn is_available(&self) -> bool {
        true
    }

    fn request_input(&mut self) -> Result<(), CaptureError> {
        let mut s = self.state.lock();
        s.counts.requests += 1;
        if let Some(e) = s.fail_request.take() {
            return Err(e);
        }
        s.acquired = true;
        Ok(())
    }

    fn build_graph(&mut self, _block_len: usize, on_block: RawBlockCallback) -> Result<(), CaptureError> {
        let mut s = self.state.lock();
        s.counts.builds += 1;
        if let Some(e) = s.fail_build.take() {
            return Err(e);
        }
        s.callback = Some(on_block);
        s.live_rate = Some(s.configured_rate);
        s.fault = None;
        Ok(())
    }

    fn sample_rate(&self) -> Option<u32> {
        self.state.lock().live_rate
    }

    fn disconnect_graph(&mut self) -> Result<(), CaptureError> {
        let mut s = self.state.lock();
        s.counts.disconnects += 1;
        s.callback = None;
        if s.fail_disconnect {
            return Err(CaptureError::Teardown("scripted disconnect failure".into()));
        }
        Ok(())
    }

    fn stop_tracks(&mut self) -> Result<(), CaptureError> {
        let mut s = self.state.lock();
        s.counts.track_stops += 1;
        s.live_rate = None;
        Ok(())
    }

    fn release_device(&mut self) -> Result<(), CaptureError> {
        let mut s = self.state.lock();
        s.counts.releases += 1;
        s.acquired = false;
        Ok(())
    }

    fn take_fault(&mut self) -> Option<CaptureError> {
        self.state.lock().fault.take()
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: "manual".into(),
            name: "Manual Input".into(),
            is_default: false,
            transport_type: Some(AudioTransportType::Virtual),
        }
    }
}
