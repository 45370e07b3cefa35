use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::audio_models::{AudioSource, AudioTransportType};
use crate::models::error::CaptureError;
use crate::traits::audio_input::{AudioInput, RawBlockCallback};

/// Real-time sine generator standing in for a microphone.
///
/// Delivers fixed-size blocks on a dedicated thread at the cadence real
/// hardware would (`block_len / sample_rate` seconds apart).
pub struct SyntheticInput {
    sample_rate: u32,
    frequency: f32,
    amplitude: f32,
    acquired: bool,
    delivering: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SyntheticInput {
    pub fn new(sample_rate: u32) -> Self {
        Self::tone(sample_rate, 440.0, 0.3)
    }

    pub fn tone(sample_rate: u32, frequency: f32, amplitude: f32) -> Self {
        Self {
            sample_rate,
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
            acquired: false,
            delivering: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl AudioInput for SyntheticInput {
    fn is_available(&self) -> bool {
        true
    }

    fn request_input(&mut self) -> Result<(), CaptureError> {
        if self.sample_rate == 0 {
            return Err(CaptureError::DeviceNotAvailable);
        }
        self.acquired = true;
        Ok(())
    }

    fn build_graph(&mut self, block_len: usize, on_block: RawBlockCallback) -> Result<(), CaptureError> {
        if !self.acquired {
            return Err(CaptureError::InvalidState("input not acquired".into()));
        }
        if self.handle.is_some() {
            return Err(CaptureError::InvalidState("synthetic graph already running".into()));
        }

        let block_len = block_len.max(1);
        let rate = self.sample_rate;
        let step = TAU * self.frequency / rate as f32;
        let amplitude = self.amplitude;
        let block_period = Duration::from_secs_f64(block_len as f64 / rate as f64);

        self.delivering.store(true, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        let delivering = Arc::clone(&self.delivering);
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("synthetic-input".into())
            .spawn(move || {
                let mut phase = 0.0f32;
                let mut block = vec![0.0f32; block_len];
                let mut deadline = Instant::now() + block_period;
                while running.load(Ordering::SeqCst) {
                    thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    deadline += block_period;

                    for sample in block.iter_mut() {
                        *sample = phase.sin() * amplitude;
                        phase = (phase + step) % TAU;
                    }
                    if delivering.load(Ordering::SeqCst) {
                        on_block(&block);
                    }
                }
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn synthetic input: {}", e)))?;

        self.handle = Some(handle);
        Ok(())
    }

    fn sample_rate(&self) -> Option<u32> {
        self.handle.as_ref().map(|_| self.sample_rate)
    }

    fn disconnect_graph(&mut self) -> Result<(), CaptureError> {
        self.delivering.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop_tracks(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| CaptureError::Teardown("synthetic input thread panicked".into()))?;
        }
        Ok(())
    }

    fn release_device(&mut self) -> Result<(), CaptureError> {
        self.acquired = false;
        Ok(())
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: "synthetic".into(),
            name: format!("Synthetic {} Hz tone", self.frequency),
            is_default: false,
            transport_type: Some(AudioTransportType::Virtual),
        }
    }
}

impl Drop for SyntheticInput {
    fn drop(&mut self) {
        let _ = self.disconnect_graph();
        let _ = self.stop_tracks();
    }
}
