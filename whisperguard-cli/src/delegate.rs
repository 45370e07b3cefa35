use parking_lot::Mutex;

use whisperguard_core::{CaptureDelegate, CaptureError, ChunkOutcome, ContainerArchive, EncodedContainer, SessionState};

/// Delegate that logs controller events and optionally archives every
/// container before it is sent.
pub struct CliDelegate {
    archive: Option<ContainerArchive>,
    failures: Mutex<u64>,
}

impl CliDelegate {
    pub fn new(archive: Option<ContainerArchive>) -> Self {
        Self {
            archive,
            failures: Mutex::new(0),
        }
    }

    pub fn failures(&self) -> u64 {
        *self.failures.lock()
    }
}

impl CaptureDelegate for CliDelegate {
    fn on_state_changed(&self, state: &SessionState) {
        log::info!("State: {}", state);
    }

    fn on_error(&self, error: &CaptureError) {
        log::error!("{}", error);
    }

    fn on_chunk_encoded(&self, container: &EncodedContainer) {
        let Some(archive) = &self.archive else { return };
        if let Err(e) = archive.save(container) {
            log::warn!("Could not archive {}: {}", container.file_name(), e);
        }
    }

    fn on_chunk_dispatched(&self, outcome: &ChunkOutcome) {
        match &outcome.result {
            Ok(result) => println!("chunk {:>5}  {}", outcome.sequence, result.body),
            Err(e) => {
                *self.failures.lock() += 1;
                log::warn!("chunk {} failed: {}", outcome.sequence, e);
            }
        }
    }
}
