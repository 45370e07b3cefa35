use crate::models::analysis::ChunkOutcome;
use crate::models::container::EncodedContainer;
use crate::models::error::CaptureError;
use crate::models::state::SessionState;

/// Event delegate for controller notifications.
///
/// Methods may be called from the timer or dispatch threads, not the
/// caller's thread. All methods default to no-ops.
pub trait CaptureDelegate: Send + Sync {
    /// Called after every state transition.
    fn on_state_changed(&self, _state: &SessionState) {}

    /// Called when an error is surfaced (start failure, dispatch failure).
    fn on_error(&self, _error: &CaptureError) {}

    /// Called with each container right before it is dispatched.
    fn on_chunk_encoded(&self, _container: &EncodedContainer) {}

    /// Called when a streamed chunk's dispatch completes, in completion order.
    fn on_chunk_dispatched(&self, _outcome: &ChunkOutcome) {}
}
