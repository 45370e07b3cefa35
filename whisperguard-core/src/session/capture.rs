use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioSource, SessionDiagnostics};
use crate::models::error::CaptureError;
use crate::processing::sample_buffer::SampleBlock;
use crate::traits::audio_input::{AudioInput, RawBlockCallback};

/// Observer receiving each hardware block as an owned copy.
pub type BlockObserver = Arc<dyn Fn(SampleBlock) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed,
    /// Device requested; graph not (yet) running.
    Acquired,
    Running,
}

/// One open audio-input handle plus the graph feeding its observers.
///
/// The session owns its input for its whole life, so it can be opened,
/// closed, and opened again. Dropping an open session closes it.
pub struct CaptureSession<I: AudioInput> {
    input: I,
    phase: Phase,
    fallback_sample_rate: u32,
    /// Replaced wholesale on registration so the audio thread only clones an `Arc`.
    observers: Arc<Mutex<Arc<[BlockObserver]>>>,
    diagnostics: Arc<Mutex<SessionDiagnostics>>,
}

impl<I: AudioInput> CaptureSession<I> {
    pub fn new(input: I, fallback_sample_rate: u32) -> Self {
        Self {
            input,
            phase: Phase::Closed,
            fallback_sample_rate,
            observers: Arc::new(Mutex::new(Arc::from(Vec::new()))),
            diagnostics: Arc::new(Mutex::new(SessionDiagnostics::default())),
        }
    }

    /// Register an observer for incoming blocks.
    ///
    /// Register before `open` so the first block is not missed. Observers are
    /// dropped by `close`.
    pub fn on_block(&mut self, observer: BlockObserver) {
        let mut observers = self.observers.lock();
        let mut next = observers.to_vec();
        next.push(observer);
        *observers = Arc::from(next);
    }

    /// Acquire the device and start block delivery.
    ///
    /// Returns the session's sample rate. If any step fails, everything
    /// acquired so far is released before the error is returned.
    pub fn open(&mut self, block_len: usize) -> Result<u32, CaptureError> {
        if self.phase != Phase::Closed {
            return Err(CaptureError::InvalidState("capture session already open".into()));
        }

        self.phase = Phase::Acquired;
        self.diagnostics.lock().opens += 1;

        if let Err(e) = self.input.request_input() {
            log::warn!("Audio input request failed: {}", e);
            self.close();
            return Err(e);
        }

        let callback = self.block_callback();
        if let Err(e) = self.input.build_graph(block_len, callback) {
            log::error!("Failed to build capture graph: {}", e);
            self.close();
            return Err(e);
        }

        self.phase = Phase::Running;
        let rate = self.sample_rate();
        log::info!(
            "Capture session open on {} at {} Hz, {} samples per block",
            self.input.device_info().name,
            rate,
            block_len
        );
        Ok(rate)
    }

    /// Release the graph, the hardware stream, and the device.
    ///
    /// Every step runs even if an earlier one fails or panics; failures are
    /// logged and counted, never returned. No-op when already closed.
    pub fn close(&mut self) -> usize {
        *self.observers.lock() = Arc::from(Vec::new());
        if self.phase == Phase::Closed {
            return 0;
        }

        let steps: [(&str, fn(&mut I) -> Result<(), CaptureError>); 3] = [
            ("disconnect graph", I::disconnect_graph),
            ("stop tracks", I::stop_tracks),
            ("release device", I::release_device),
        ];

        let mut failures = 0;
        for (name, step) in steps {
            let input = &mut self.input;
            let error = match panic::catch_unwind(AssertUnwindSafe(|| step(input))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(_) => CaptureError::Teardown(format!("{} panicked", name)),
            };
            log::warn!("Teardown step '{}' failed: {}", name, error);
            failures += 1;
        }

        self.phase = Phase::Closed;
        self.diagnostics.lock().teardown_failures += failures as u64;
        log::debug!("Capture session closed ({} teardown failures)", failures);
        failures
    }

    pub fn is_open(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Live sample rate, falling back to the configured rate when unknown.
    ///
    /// Not cached: every call asks the backend.
    pub fn sample_rate(&self) -> u32 {
        self.input
            .sample_rate()
            .filter(|&r| r > 0)
            .unwrap_or(self.fallback_sample_rate)
    }

    /// Runtime device failure reported by the backend since the last call.
    pub fn take_fault(&mut self) -> Option<CaptureError> {
        if self.phase != Phase::Running {
            return None;
        }
        let fault = self.input.take_fault();
        if let Some(ref e) = fault {
            log::error!("Audio input failed while running: {}", e);
        }
        fault
    }

    pub fn device_info(&self) -> AudioSource {
        self.input.device_info()
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        *self.diagnostics.lock()
    }

    pub fn blocks_delivered(&self) -> u64 {
        self.diagnostics.lock().blocks_delivered
    }

    /// Raw callback handed to the backend: copy once, then fan out.
    fn block_callback(&self) -> RawBlockCallback {
        let observers = Arc::clone(&self.observers);
        let diagnostics = Arc::clone(&self.diagnostics);

        Arc::new(move |samples: &[f32]| {
            let block = SampleBlock::from_slice(samples);
            {
                let mut d = diagnostics.lock();
                d.blocks_delivered += 1;
                d.samples_delivered += block.len() as u64;
            }

            let targets = Arc::clone(&*observers.lock());
            if let Some((last, rest)) = targets.split_last() {
                for observer in rest {
                    observer(block.clone());
                }
                last(block);
            }
        })
    }
}

impl<I: AudioInput> Drop for CaptureSession<I> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualInput;

    fn collector(session: &mut CaptureSession<ManualInput>) -> Arc<Mutex<Vec<SampleBlock>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.on_block(Arc::new(move |block: SampleBlock| sink.lock().push(block)));
        seen
    }

    #[test]
    fn open_reports_sample_rate_and_delivers_copies() {
        let input = ManualInput::new(48000);
        let mut session = CaptureSession::new(input.clone(), 44100);
        let seen = collector(&mut session);

        assert_eq!(session.open(4).unwrap(), 48000);
        assert!(session.is_open());

        let mut hw = [0.1f32, 0.2, 0.3, 0.4];
        assert!(input.push(&hw));
        hw.fill(0.0); // platform reuses its buffer
        assert!(input.push(&[0.5, 0.6]));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].as_slice(), &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(seen[1].as_slice(), &[0.5, 0.6]);
        assert_eq!(session.diagnostics().samples_delivered, 6);
        assert_eq!(session.blocks_delivered(), 2);
    }

    #[test]
    fn every_observer_sees_every_block() {
        let input = ManualInput::new(16000);
        let mut session = CaptureSession::new(input.clone(), 44100);
        let a = collector(&mut session);
        let b = collector(&mut session);
        session.open(2).unwrap();

        input.push(&[1.0, -1.0]);
        assert_eq!(a.lock().len(), 1);
        assert_eq!(b.lock()[0].as_slice(), &[1.0, -1.0]);
    }

    #[test]
    fn device_error_releases_partial_session() {
        let input = ManualInput::new(48000);
        input.fail_next_request(CaptureError::PermissionDenied);
        let mut session = CaptureSession::new(input.clone(), 44100);

        assert_eq!(session.open(1024), Err(CaptureError::PermissionDenied));
        assert!(!session.is_open());

        let counts = input.counts();
        assert_eq!(counts.disconnects, 1);
        assert_eq!(counts.track_stops, 1);
        assert_eq!(counts.releases, 1);
    }

    #[test]
    fn graph_failure_releases_acquired_device() {
        let input = ManualInput::new(48000);
        input.fail_next_build(CaptureError::ConfigurationFailed("no graph".into()));
        let mut session = CaptureSession::new(input.clone(), 44100);

        assert!(session.open(1024).is_err());
        assert!(!input.is_acquired());
        assert_eq!(input.counts().releases, 1);
    }

    #[test]
    fn close_is_idempotent() {
        let input = ManualInput::new(48000);
        let mut session = CaptureSession::new(input.clone(), 44100);
        session.open(16).unwrap();

        assert_eq!(session.close(), 0);
        assert_eq!(session.close(), 0);
        assert_eq!(input.counts().releases, 1);
        assert!(!input.push(&[0.0]));
    }

    #[test]
    fn failing_step_does_not_block_later_steps() {
        let input = ManualInput::new(48000);
        input.fail_disconnect(true);
        let mut session = CaptureSession::new(input.clone(), 44100);
        session.open(16).unwrap();

        assert_eq!(session.close(), 1);
        let counts = input.counts();
        assert_eq!(counts.track_stops, 1);
        assert_eq!(counts.releases, 1);
        assert_eq!(session.diagnostics().teardown_failures, 1);
    }

    #[test]
    fn reopen_after_close() {
        let input = ManualInput::new(22050);
        let mut session = CaptureSession::new(input.clone(), 44100);
        session.open(8).unwrap();
        session.close();

        let seen = collector(&mut session);
        assert_eq!(session.open(8).unwrap(), 22050);
        input.push(&[0.25]);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(session.diagnostics().opens, 2);
    }

    #[test]
    fn double_open_is_rejected() {
        let mut session = CaptureSession::new(ManualInput::new(48000), 44100);
        session.open(8).unwrap();
        assert!(matches!(session.open(8), Err(CaptureError::InvalidState(_))));
    }

    #[test]
    fn sample_rate_falls_back_when_closed() {
        let input = ManualInput::new(48000);
        let mut session = CaptureSession::new(input, 44100);
        assert_eq!(session.sample_rate(), 44100);
        session.open(8).unwrap();
        assert_eq!(session.sample_rate(), 48000);
    }

    #[test]
    fn drop_closes_open_session() {
        let input = ManualInput::new(48000);
        {
            let mut session = CaptureSession::new(input.clone(), 44100);
            session.open(8).unwrap();
        }
        assert_eq!(input.counts().releases, 1);
    }

    #[test]
    fn observer_added_while_open_sees_later_blocks() {
        let input = ManualInput::new(8000);
        let mut session = CaptureSession::new(input.clone(), 44100);
        let early = collector(&mut session);
        session.open(2).unwrap();

        input.push(&[0.1, 0.2]);
        let late = collector(&mut session);
        input.push(&[0.3, 0.4]);

        assert_eq!(early.lock().len(), 2);
        assert_eq!(late.lock().len(), 1);
        assert_eq!(late.lock()[0].as_slice(), &[0.3, 0.4]);

        session.close();
        session.open(2).unwrap();
        input.push(&[0.5, 0.6]);
        assert_eq!(early.lock().len(), 2);
        assert_eq!(late.lock().len(), 1);
    }

    #[test]
    fn runtime_fault_is_reported_once_while_open() {
        let input = ManualInput::new(8000);
        let mut session = CaptureSession::new(input.clone(), 44100);
        session.open(2).unwrap();

        input.fail_device(CaptureError::DeviceNotAvailable);
        assert_eq!(session.take_fault(), Some(CaptureError::DeviceNotAvailable));
        assert_eq!(session.take_fault(), None);
        assert!(!input.push(&[0.0, 0.0]));

        session.close();
        input.fail_device(CaptureError::DeviceNotAvailable);
        assert_eq!(session.take_fault(), None);
    }
}
