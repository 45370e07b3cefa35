use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::analysis::{AnalysisParams, AnalysisResult};
use crate::models::config::CaptureConfiguration;
use crate::models::container::{ContainerKind, EncodedContainer};
use crate::models::error::CaptureError;
use crate::models::state::SessionState;
use crate::processing::sample_buffer::{SampleBlock, SampleBuffer};
use crate::session::capture::CaptureSession;
use crate::traits::audio_input::AudioInput;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::dispatcher::Dispatcher;

/// One-shot mode: capture everything, then encode and dispatch once on stop.
///
/// ```text
/// [AudioInput] → [CaptureSession] → [SampleBuffer] ─(stop)→ [WAV] → [Dispatcher]
/// ```
pub struct RecordingController<I: AudioInput, D: Dispatcher> {
    session: CaptureSession<I>,
    dispatcher: D,
    config: CaptureConfiguration,
    buffer: Arc<Mutex<SampleBuffer>>,
    state: SessionState,
    delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl<I: AudioInput, D: Dispatcher> RecordingController<I, D> {
    pub fn new(input: I, dispatcher: D, config: CaptureConfiguration) -> Self {
        Self {
            session: CaptureSession::new(input, config.fallback_sample_rate),
            dispatcher,
            config,
            buffer: Arc::new(Mutex::new(SampleBuffer::new())),
            state: SessionState::Idle,
            delegate: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn params(&self) -> AnalysisParams {
        self.config.params
    }

    pub fn set_params(&mut self, params: AnalysisParams) -> Result<(), CaptureError> {
        params.validate().map_err(CaptureError::ConfigurationFailed)?;
        self.config.params = params;
        Ok(())
    }

    /// Samples captured so far in the current recording.
    pub fn buffered_samples(&self) -> usize {
        self.buffer.lock().total_len()
    }

    pub fn session(&self) -> &CaptureSession<I> {
        &self.session
    }

    /// Open the input and start accumulating into a fresh buffer.
    /// Transitions: idle/error → recording, or → error on device failure.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if !self.state.can_start() {
            return Err(CaptureError::InvalidState(format!(
                "cannot start recording while {}",
                self.state.name()
            )));
        }
        self.config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let buffer = Arc::new(Mutex::new(SampleBuffer::new()));
        self.buffer = Arc::clone(&buffer);
        self.session.on_block(Arc::new(move |block: SampleBlock| buffer.lock().append(block)));

        match self.session.open(self.config.block_len) {
            Ok(rate) => {
                log::info!("Recording started at {} Hz", rate);
                self.set_state(SessionState::Recording);
                Ok(())
            }
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Stop, encode the whole recording, release the input, and dispatch.
    ///
    /// Returns `Ok(None)` without doing anything when idle. From an error
    /// state it only cleans up and returns to idle. The input is released
    /// before dispatching, whatever the outcome. Dispatch failures are
    /// returned and leave the controller in `Error`; nothing is retried.
    pub fn stop(&mut self) -> Result<Option<AnalysisResult>, CaptureError> {
        self.check_device()?;
        match self.state {
            SessionState::Idle => return Ok(None),
            SessionState::Recording => {}
            _ => {
                self.session.close();
                self.buffer.lock().clear();
                self.set_state(SessionState::Idle);
                return Ok(None);
            }
        }

        self.set_state(SessionState::Stopping);

        let container = {
            let samples = self.buffer.lock().drain_all();
            let sample_rate = self.session.sample_rate();
            EncodedContainer::encode(ContainerKind::Recording, samples.as_slice(), sample_rate)
        };
        self.session.close();

        if container.sample_count() == 0 {
            log::warn!("Stopping an empty recording; sending header-only container");
        }
        log::info!(
            "Recording stopped: {} samples ({:.2}s) at {} Hz",
            container.sample_count(),
            container.duration_secs(),
            container.sample_rate()
        );

        if let Some(ref delegate) = self.delegate {
            delegate.on_chunk_encoded(&container);
        }

        match self.dispatcher.submit(&container, &self.config.params) {
            Ok(result) => {
                self.set_state(SessionState::Idle);
                Ok(Some(result))
            }
            Err(e) => {
                let error = CaptureError::from(e);
                log::error!("Recording dispatch failed: {}", error);
                self.fail(error.clone());
                Err(error)
            }
        }
    }

    /// Surface a device failure that happened while recording.
    ///
    /// The partial recording is discarded, the input released, and the
    /// controller moves to `Error`. No-op in every other state.
    pub fn check_device(&mut self) -> Result<(), CaptureError> {
        if self.state != SessionState::Recording {
            return Ok(());
        }
        match self.session.take_fault() {
            None => Ok(()),
            Some(error) => {
                self.session.close();
                let lost = self.buffer.lock().drain_all().len();
                log::warn!("Discarding {} samples after device failure", lost);
                self.fail(error.clone());
                Err(error)
            }
        }
    }

    /// Submit an already-encoded container (e.g. an uploaded file).
    ///
    /// Independent of the capture state machine.
    pub fn analyze_container(&self, container: &EncodedContainer) -> Result<AnalysisResult, CaptureError> {
        self.dispatcher
            .submit(container, &self.config.params)
            .map_err(|e| {
                let error = CaptureError::from(e);
                if let Some(ref delegate) = self.delegate {
                    delegate.on_error(&error);
                }
                error
            })
    }

    fn fail(&mut self, error: CaptureError) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(&error);
        }
        self.set_state(SessionState::Error(error));
    }

    fn set_state(&mut self, new_state: SessionState) {
        log::debug!("Recording state: {} → {}", self.state.name(), new_state.name());
        self.state = new_state;
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(&self.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::error::DispatchError;
    use crate::processing::wav_format::{self, WavHeader};
    use crate::testing::{ManualInput, RecordingDelegate, RecordingDispatcher};

    fn controller(rate: u32) -> (
        RecordingController<ManualInput, Arc<RecordingDispatcher>>,
        ManualInput,
        Arc<RecordingDispatcher>,
    ) {
        let input = ManualInput::new(rate);
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let ctrl = RecordingController::new(input.clone(), Arc::clone(&dispatcher), CaptureConfiguration::default());
        (ctrl, input, dispatcher)
    }

    #[test]
    fn records_everything_and_dispatches_once() {
        let (mut ctrl, input, dispatcher) = controller(16000);
        ctrl.start().unwrap();
        assert_eq!(ctrl.state(), &SessionState::Recording);

        let fed: Vec<f32> = (0..10_000).map(|i| (i as f32 / 10_000.0) - 0.5).collect();
        for block in fed.chunks(4096) {
            input.push(block);
        }
        assert_eq!(ctrl.buffered_samples(), 10_000);

        let result = ctrl.stop().unwrap();
        assert!(result.is_some());
        assert_eq!(ctrl.state(), &SessionState::Idle);

        let sent = dispatcher.submissions();
        assert_eq!(sent.len(), 1);
        let container = &sent[0].container;
        assert_eq!(container.file_name(), "recording.wav");

        let header = WavHeader::parse(container.bytes()).unwrap();
        assert_eq!(header.sample_rate, 16000);
        assert_eq!(header.data_size, 20_000);
        assert_eq!(container.bytes(), wav_format::encode_pcm16_mono(&fed, 16000).as_slice());
    }

    #[test]
    fn input_is_released_before_dispatch_result() {
        let (mut ctrl, input, dispatcher) = controller(16000);
        dispatcher.fail_all(true);
        ctrl.start().unwrap();
        input.push(&[0.1; 100]);

        let err = ctrl.stop().unwrap_err();
        assert!(matches!(err, CaptureError::Dispatch(DispatchError::Status { .. })));
        assert!(ctrl.state().is_error());
        assert_eq!(input.counts().releases, 1);
        assert!(!input.push(&[0.1]));
    }

    #[test]
    fn device_error_enters_error_state() {
        let (mut ctrl, input, dispatcher) = controller(16000);
        let delegate = Arc::new(RecordingDelegate::new());
        ctrl.set_delegate(delegate.clone());
        input.fail_next_request(CaptureError::DeviceNotAvailable);

        assert_eq!(ctrl.start(), Err(CaptureError::DeviceNotAvailable));
        assert_eq!(ctrl.state(), &SessionState::Error(CaptureError::DeviceNotAvailable));
        assert_eq!(delegate.errors(), vec![CaptureError::DeviceNotAvailable]);
        assert!(dispatcher.submissions().is_empty());

        // A later start succeeds once the device is back.
        ctrl.start().unwrap();
        assert_eq!(ctrl.state(), &SessionState::Recording);
    }

    #[test]
    fn stop_when_idle_is_noop() {
        let (mut ctrl, _input, dispatcher) = controller(16000);
        assert_eq!(ctrl.stop(), Ok(None));
        assert_eq!(ctrl.stop(), Ok(None));
        assert!(ctrl.state().is_idle());
        assert!(dispatcher.submissions().is_empty());
    }

    #[test]
    fn stop_twice_after_recording() {
        let (mut ctrl, input, dispatcher) = controller(8000);
        ctrl.start().unwrap();
        input.push(&[0.0; 10]);
        assert!(ctrl.stop().unwrap().is_some());
        assert_eq!(ctrl.stop(), Ok(None));
        assert!(ctrl.state().is_idle());
        assert_eq!(dispatcher.submissions().len(), 1);
    }

    #[test]
    fn stop_from_error_returns_to_idle() {
        let (mut ctrl, input, dispatcher) = controller(8000);
        dispatcher.fail_all(true);
        ctrl.start().unwrap();
        input.push(&[0.0; 10]);
        assert!(ctrl.stop().is_err());

        assert_eq!(ctrl.stop(), Ok(None));
        assert!(ctrl.state().is_idle());
    }

    #[test]
    fn start_while_recording_is_rejected() {
        let (mut ctrl, _input, _dispatcher) = controller(8000);
        ctrl.start().unwrap();
        assert!(matches!(ctrl.start(), Err(CaptureError::InvalidState(_))));
        assert_eq!(ctrl.state(), &SessionState::Recording);
    }

    #[test]
    fn each_recording_starts_with_empty_buffer() {
        let (mut ctrl, input, dispatcher) = controller(8000);
        ctrl.start().unwrap();
        input.push(&[0.5; 30]);
        ctrl.stop().unwrap();

        ctrl.start().unwrap();
        input.push(&[0.5; 7]);
        ctrl.stop().unwrap();

        let sent = dispatcher.submissions();
        assert_eq!(sent[0].container.sample_count(), 30);
        assert_eq!(sent[1].container.sample_count(), 7);
    }

    #[test]
    fn empty_recording_is_still_sent() {
        let (mut ctrl, _input, dispatcher) = controller(8000);
        ctrl.start().unwrap();
        ctrl.stop().unwrap();
        assert_eq!(dispatcher.submissions()[0].container.bytes().len(), 44);
    }

    #[test]
    fn params_travel_with_container() {
        let (mut ctrl, _input, dispatcher) = controller(8000);
        ctrl.set_params(AnalysisParams {
            sensitivity: 0.9,
            force_save: true,
        })
        .unwrap();
        ctrl.start().unwrap();
        ctrl.stop().unwrap();
        let params = dispatcher.submissions()[0].params;
        assert!(params.force_save);
        assert_eq!(params.sensitivity, 0.9);
    }

    #[test]
    fn analyze_container_does_not_touch_state() {
        let (ctrl, _input, dispatcher) = controller(8000);
        let bytes = wav_format::encode_pcm16_mono(&[0.0; 80], 8000);
        let upload = EncodedContainer::from_wav_bytes("clip.wav", bytes).unwrap();

        ctrl.analyze_container(&upload).unwrap();
        assert!(ctrl.state().is_idle());
        assert_eq!(dispatcher.submissions()[0].container.file_name(), "clip.wav");
    }

    #[test]
    fn state_changes_reach_delegate() {
        let (mut ctrl, _input, _dispatcher) = controller(8000);
        let delegate = Arc::new(RecordingDelegate::new());
        ctrl.set_delegate(delegate.clone());

        ctrl.start().unwrap();
        ctrl.stop().unwrap();
        assert_eq!(
            delegate.states(),
            vec![SessionState::Recording, SessionState::Stopping, SessionState::Idle]
        );
        assert_eq!(delegate.encoded_count(), 1);
    }

    #[test]
    fn device_failure_while_recording_surfaces_on_stop() {
        let (mut ctrl, input, dispatcher) = controller(8000);
        let delegate = Arc::new(RecordingDelegate::new());
        ctrl.set_delegate(delegate.clone());
        ctrl.start().unwrap();
        input.push(&[0.2; 40]);

        assert_eq!(ctrl.check_device(), Ok(()));
        input.fail_device(CaptureError::DeviceNotAvailable);

        assert_eq!(ctrl.stop(), Err(CaptureError::DeviceNotAvailable));
        assert_eq!(ctrl.state(), &SessionState::Error(CaptureError::DeviceNotAvailable));
        assert_eq!(delegate.errors(), vec![CaptureError::DeviceNotAvailable]);
        assert_eq!(input.counts().releases, 1);
        assert_eq!(ctrl.buffered_samples(), 0);
        assert!(dispatcher.submissions().is_empty());

        assert_eq!(ctrl.stop(), Ok(None));
        assert!(ctrl.state().is_idle());
        ctrl.start().unwrap();
        assert!(input.push(&[0.1; 4]));
    }
}
