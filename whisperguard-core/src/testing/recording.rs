use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde_json::json;

use crate::models::analysis::{AnalysisParams, AnalysisResult, ChunkOutcome};
use crate::models::container::EncodedContainer;
use crate::models::error::{CaptureError, DispatchError};
use crate::models::state::SessionState;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::dispatcher::Dispatcher;

/// One call to [`RecordingDispatcher::submit`].
#[derive(Debug, Clone)]
pub struct Submission {
    pub container: EncodedContainer,
    pub params: AnalysisParams,
}

/// A [`Dispatcher`] that records submissions and fails on request.
#[derive(Default)]
pub struct RecordingDispatcher {
    submissions: Mutex<Vec<Submission>>,
    arrived: Condvar,
    fail_sequences: Mutex<HashSet<u64>>,
    fail_all: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the chunk with this sequence number.
    pub fn fail_sequence(&self, sequence: u64) {
        self.fail_sequences.lock().insert(sequence);
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    /// Submitted chunk containers ordered by sequence number.
    pub fn chunks_in_order(&self) -> Vec<EncodedContainer> {
        let mut chunks: Vec<EncodedContainer> = self
            .submissions
            .lock()
            .iter()
            .filter(|s| s.container.sequence().is_some())
            .map(|s| s.container.clone())
            .collect();
        chunks.sort_by_key(|c| c.sequence());
        chunks
    }

    /// Block until at least `count` submissions arrived, or `timeout` passes.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut submissions = self.submissions.lock();
        while submissions.len() < count {
            if self.arrived.wait_until(&mut submissions, deadline).timed_out() {
                return submissions.len() >= count;
            }
        }
        true
    }

    fn should_fail(&self, container: &EncodedContainer) -> bool {
        if self.fail_all.load(Ordering::SeqCst) {
            return true;
        }
        container
            .sequence()
            .is_some_and(|seq| self.fail_sequences.lock().contains(&seq))
    }
}

impl Dispatcher for RecordingDispatcher {
    fn submit(&self, container: &EncodedContainer, params: &AnalysisParams) -> Result<AnalysisResult, DispatchError> {
        let fail = self.should_fail(container);
        {
            let mut submissions = self.submissions.lock();
            submissions.push(Submission {
                container: container.clone(),
                params: *params,
            });
        }
        self.arrived.notify_all();

        if fail {
            return Err(DispatchError::Status {
                status: 503,
                body: "scripted failure".into(),
            });
        }
        Ok(AnalysisResult::new(json!({
            "level": "Normal",
            "file": container.file_name(),
            "samples": container.sample_count(),
        })))
    }
}

#[derive(Default)]
struct DelegateLog {
    states: Vec<SessionState>,
    errors: Vec<CaptureError>,
    outcomes: Vec<ChunkOutcome>,
    encoded: usize,
}

/// A [`CaptureDelegate`] that records every notification.
#[derive(Default)]
pub struct RecordingDelegate {
    log: Mutex<DelegateLog>,
    changed: Condvar,
}

impl RecordingDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.log.lock().states.clone()
    }

    pub fn errors(&self) -> Vec<CaptureError> {
        self.log.lock().errors.clone()
    }

    pub fn outcomes(&self) -> Vec<ChunkOutcome> {
        self.log.lock().outcomes.clone()
    }

    pub fn encoded_count(&self) -> usize {
        self.log.lock().encoded
    }

    /// Block until at least `count` chunk outcomes arrived, or `timeout` passes.
    pub fn wait_for_outcomes(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut log = self.log.lock();
        while log.outcomes.len() < count {
            if self.changed.wait_until(&mut log, deadline).timed_out() {
                return log.outcomes.len() >= count;
            }
        }
        true
    }
}

impl CaptureDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: &SessionState) {
        self.log.lock().states.push(state.clone());
    }

    fn on_error(&self, error: &CaptureError) {
        self.log.lock().errors.push(error.clone());
    }

    fn on_chunk_encoded(&self, _container: &EncodedContainer) {
        self.log.lock().encoded += 1;
    }

    fn on_chunk_dispatched(&self, outcome: &ChunkOutcome) {
        self.log.lock().outcomes.push(outcome.clone());
        self.changed.notify_all();
    }
}
