use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::analysis::{AnalysisParams, ChunkOutcome};
use crate::models::config::CaptureConfiguration;
use crate::models::container::{ContainerKind, EncodedContainer};
use crate::models::error::{CaptureError, DispatchError};
use crate::models::state::SessionState;
use crate::processing::sample_buffer::{SampleBlock, SampleBuffer};
use crate::session::capture::CaptureSession;
use crate::traits::audio_input::AudioInput;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::dispatcher::Dispatcher;

/// Result of a single timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The controller is not streaming.
    NotRunning,
    /// Less than one full chunk is buffered; nothing was consumed.
    Skipped { buffered: usize, needed: usize },
    /// A chunk was framed and handed to a dispatch thread.
    Dispatched { sequence: u64, sample_count: usize },
    /// The input failed while streaming; the controller is now in `Error`.
    DeviceLost,
}

/// State shared between the controller, its timer thread, and the audio callback.
struct ChunkPump<I: AudioInput, D: Dispatcher> {
    session: Mutex<CaptureSession<I>>,
    buffer: Arc<Mutex<SampleBuffer>>,
    dispatcher: Arc<D>,
    params: Mutex<AnalysisParams>,
    delegate: Mutex<Option<Arc<dyn CaptureDelegate>>>,
    state: Mutex<SessionState>,
    running: AtomicBool,
    next_sequence: AtomicU64,
    in_flight: Arc<AtomicUsize>,
    last_rate: AtomicU32,
}

impl<I: AudioInput, D: Dispatcher + 'static> ChunkPump<I, D> {
    /// Frame exactly one second of audio, if available, and dispatch it.
    ///
    /// The window length is the live sample rate, read on every tick. A rate
    /// change mid-stream changes the framing of later chunks; this is
    /// logged but not prevented.
    fn tick(&self) -> TickOutcome {
        if !self.running.load(Ordering::SeqCst) {
            return TickOutcome::NotRunning;
        }

        let (fault, sample_rate) = {
            let mut session = self.session.lock();
            (session.take_fault(), session.sample_rate())
        };
        if let Some(error) = fault {
            self.running.store(false, Ordering::SeqCst);
            let dropped = self.buffer.lock().clear();
            log::warn!("Streaming halted by device failure, {} samples discarded", dropped);
            self.fail(error);
            return TickOutcome::DeviceLost;
        }

        let previous = self.last_rate.swap(sample_rate, Ordering::SeqCst);
        if previous != 0 && previous != sample_rate {
            log::warn!("Sample rate changed mid-stream: {} Hz → {} Hz", previous, sample_rate);
        }
        let needed = sample_rate as usize;

        let chunk = {
            let mut buffer = self.buffer.lock();
            match buffer.extract_exact(needed) {
                Some(chunk) => chunk,
                None => {
                    let buffered = buffer.total_len();
                    log::trace!("Tick skipped: {}/{} samples buffered", buffered, needed);
                    return TickOutcome::Skipped { buffered, needed };
                }
            }
        };

        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let container = EncodedContainer::encode(ContainerKind::Chunk { sequence }, chunk.as_slice(), sample_rate);
        let sample_count = container.sample_count();

        let delegate = self.delegate.lock().clone();
        if let Some(ref d) = delegate {
            d.on_chunk_encoded(&container);
        }

        self.spawn_dispatch(container, delegate);
        TickOutcome::Dispatched { sequence, sample_count }
    }

    fn fail(&self, error: CaptureError) {
        if let Some(d) = self.delegate.lock().clone() {
            d.on_error(&error);
        }
        self.set_state(SessionState::Error(error));
    }

    /// Delegate is called without holding the state lock.
    fn set_state(&self, new_state: SessionState) {
        {
            let mut state = self.state.lock();
            log::debug!("Streaming state: {} → {}", state.name(), new_state.name());
            *state = new_state.clone();
        }
        if let Some(d) = self.delegate.lock().clone() {
            d.on_state_changed(&new_state);
        }
    }

    /// Fire-and-forget: chunk n's outcome never affects chunk n+1.
    fn spawn_dispatch(&self, container: EncodedContainer, delegate: Option<Arc<dyn CaptureDelegate>>) {
        let sequence = container.sequence().unwrap_or_default();
        let sample_count = container.sample_count();
        let params = *self.params.lock();
        let dispatcher = Arc::clone(&self.dispatcher);
        let in_flight = Arc::clone(&self.in_flight);
        let report_delegate = delegate.clone();

        in_flight.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(format!("chunk-dispatch-{}", sequence))
            .spawn(move || {
                let _pending = InFlight(in_flight);
                let result = panic::catch_unwind(AssertUnwindSafe(|| dispatcher.submit(&container, &params)))
                    .unwrap_or_else(|_| Err(DispatchError::Transport("dispatcher panicked".into())));
                report_outcome(
                    ChunkOutcome {
                        sequence,
                        sample_count,
                        result,
                    },
                    report_delegate.as_deref(),
                );
            });

        if let Err(e) = spawned {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let outcome = ChunkOutcome {
                sequence,
                sample_count,
                result: Err(DispatchError::Transport(format!("failed to spawn dispatch thread: {}", e))),
            };
            report_outcome(outcome, delegate.as_deref());
        }
    }
}

/// Decrements the in-flight count when a dispatch thread ends, even by panic.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn report_outcome(outcome: ChunkOutcome, delegate: Option<&dyn CaptureDelegate>) {
    match &outcome.result {
        Ok(_) => log::debug!("Chunk {} analyzed", outcome.sequence),
        Err(e) => log::warn!("Chunk {} dispatch failed: {}", outcome.sequence, e),
    }
    if let Some(d) = delegate {
        if let Err(ref e) = outcome.result {
            d.on_error(&CaptureError::Dispatch(e.clone()));
        }
        d.on_chunk_dispatched(&outcome);
    }
}

/// Periodic timer thread driving `ChunkPump::tick`.
///
/// Fixed-rate: deadlines are `start + k * period`, so a slow tick is
/// followed by immediate catch-up ticks rather than drifting.
struct ChunkTimer {
    stop_tx: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl ChunkTimer {
    fn arm<I, D>(pump: Arc<ChunkPump<I, D>>, period: Duration) -> Result<Self, CaptureError>
    where
        I: AudioInput + 'static,
        D: Dispatcher + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("chunk-timer".into())
            .spawn(move || {
                let mut deadline = Instant::now() + period;
                loop {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            pump.tick();
                            deadline += period;
                        }
                        // Stop signal, or the controller is gone.
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn chunk timer: {}", e)))?;

        Ok(Self { stop_tx, handle })
    }

    /// Signal the timer and wait until it can no longer tick.
    fn disarm(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            log::error!("Chunk timer thread panicked");
        }
    }
}

/// Streaming mode: every period, frame one second of audio and dispatch it.
///
/// ```text
/// [AudioInput] → [CaptureSession] → [SampleBuffer]
///                                        ↓ (timer: extract_exact(sample_rate))
///                                     [WAV] → [dispatch thread per chunk]
/// ```
pub struct ContinuousController<I: AudioInput + 'static, D: Dispatcher + 'static> {
    pump: Arc<ChunkPump<I, D>>,
    config: CaptureConfiguration,
    timer: Option<ChunkTimer>,
}

impl<I: AudioInput + 'static, D: Dispatcher + 'static> ContinuousController<I, D> {
    pub fn new(input: I, dispatcher: D, config: CaptureConfiguration) -> Self {
        let pump = ChunkPump {
            session: Mutex::new(CaptureSession::new(input, config.fallback_sample_rate)),
            buffer: Arc::new(Mutex::new(SampleBuffer::new())),
            dispatcher: Arc::new(dispatcher),
            params: Mutex::new(config.params),
            delegate: Mutex::new(None),
            state: Mutex::new(SessionState::Idle),
            running: AtomicBool::new(false),
            next_sequence: AtomicU64::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            last_rate: AtomicU32::new(0),
        };
        Self {
            pump: Arc::new(pump),
            config,
            timer: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        *self.pump.delegate.lock() = Some(delegate);
    }

    /// Current state. The timer thread moves it to `Error` if the input dies.
    pub fn state(&self) -> SessionState {
        self.pump.state.lock().clone()
    }

    /// Parameters for chunks framed from now on.
    pub fn set_params(&mut self, params: AnalysisParams) -> Result<(), CaptureError> {
        params.validate().map_err(CaptureError::ConfigurationFailed)?;
        self.config.params = params;
        *self.pump.params.lock() = params;
        Ok(())
    }

    pub fn buffered_samples(&self) -> usize {
        self.pump.buffer.lock().total_len()
    }

    /// Number of chunks framed since the controller was created.
    pub fn chunks_sent(&self) -> u64 {
        self.pump.next_sequence.load(Ordering::SeqCst)
    }

    /// Dispatches started but not yet completed.
    pub fn pending_dispatches(&self) -> usize {
        self.pump.in_flight.load(Ordering::SeqCst)
    }

    /// Live sample rate of the owned session.
    pub fn sample_rate(&self) -> u32 {
        self.pump.session.lock().sample_rate()
    }

    /// Open (or reopen) the input and arm the chunk timer.
    /// Transitions: idle/error → continuous, or → error on device failure.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        let state = self.state();
        if !state.can_start() {
            return Err(CaptureError::InvalidState(format!(
                "cannot start streaming while {}",
                state.name()
            )));
        }
        self.config.validate().map_err(CaptureError::ConfigurationFailed)?;

        // Left armed and open when the input died mid-stream.
        if let Some(timer) = self.timer.take() {
            timer.disarm();
        }

        let opened = {
            let mut session = self.pump.session.lock();
            session.close();
            let buffer = Arc::clone(&self.pump.buffer);
            buffer.lock().clear();
            session.on_block(Arc::new(move |block: SampleBlock| buffer.lock().append(block)));
            session.open(self.config.block_len)
        };
        let rate = match opened {
            Ok(rate) => rate,
            Err(e) => {
                self.pump.fail(e.clone());
                return Err(e);
            }
        };

        self.pump.last_rate.store(rate, Ordering::SeqCst);
        self.pump.running.store(true, Ordering::SeqCst);
        match ChunkTimer::arm(Arc::clone(&self.pump), self.config.chunk_period()) {
            Ok(timer) => self.timer = Some(timer),
            Err(e) => {
                self.pump.running.store(false, Ordering::SeqCst);
                self.pump.session.lock().close();
                self.pump.fail(e.clone());
                return Err(e);
            }
        }

        log::info!(
            "Streaming started at {} Hz, one chunk every {} ms",
            rate,
            self.config.chunk_period_ms
        );
        self.pump.set_state(SessionState::Continuous);
        Ok(())
    }

    /// Run one tick now, on the caller's thread.
    ///
    /// The timer calls this on its own; exposed for callers that drive
    /// framing themselves.
    pub fn tick(&self) -> TickOutcome {
        self.pump.tick()
    }

    /// Disarm the timer, release the input, and drop any partial chunk.
    ///
    /// Safe from any state and idempotent. In-flight dispatches are left to
    /// complete.
    pub fn stop(&mut self) {
        self.pump.running.store(false, Ordering::SeqCst);
        if let Some(timer) = self.timer.take() {
            timer.disarm();
        }

        self.pump.session.lock().close();
        let dropped = self.pump.buffer.lock().clear();
        if dropped > 0 {
            log::debug!("Discarded {} residual samples on stop", dropped);
        }

        if !self.state().is_idle() {
            log::info!("Streaming stopped after {} chunks", self.chunks_sent());
            self.pump.set_state(SessionState::Idle);
        }
    }
}

impl<I: AudioInput + 'static, D: Dispatcher + 'static> Drop for ContinuousController<I, D> {
    fn drop(&mut self) {
        self.stop();
    }
}
