//! # whisperguard-core
//!
//! Platform-agnostic microphone capture core.
//!
//! Buffers mono float samples delivered by an [`AudioInput`], frames them
//! as 16-bit PCM WAV containers and hands each container to a
//! [`Dispatcher`] for remote analysis. Two modes share the same pieces:
//! one-shot recording ([`RecordingController`]) and fixed-window streaming
//! ([`ContinuousController`]). Platform backends (Windows WASAPI) implement
//! `AudioInput` in their own crates.
//!
//! ## Architecture
//!
//! ```text
//! whisperguard-core (this crate)
//! ├── traits/       ← AudioInput, Dispatcher, CaptureDelegate
//! ├── models/       ← CaptureError, SessionState, configuration, EncodedContainer
//! ├── processing/   ← SampleBuffer, WAV framing and quantization
//! ├── session/      ← CaptureSession, RecordingController, ContinuousController
//! ├── dispatch/     ← HttpDispatcher (multipart upload)
//! ├── storage/      ← ContainerArchive, metadata sidecars
//! └── testing/      ← ManualInput, SyntheticInput, RecordingDispatcher
//! ```

pub mod dispatch;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod testing;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use dispatch::http::HttpDispatcher;
pub use models::analysis::{AnalysisParams, AnalysisResult, ChunkOutcome};
pub use models::audio_models::{AudioSource, AudioTransportType, SessionDiagnostics};
pub use models::config::{CaptureConfiguration, DispatchConfiguration, WhisperGuardConfig};
pub use models::container::{ContainerKind, EncodedContainer};
pub use models::error::{CaptureError, DispatchError};
pub use models::state::SessionState;
pub use processing::sample_buffer::{SampleBlock, SampleBuffer};
pub use session::capture::{BlockObserver, CaptureSession};
pub use session::continuous::{ContinuousController, TickOutcome};
pub use session::recording::RecordingController;
pub use storage::archive::{ContainerArchive, ContainerMetadata};
pub use traits::audio_input::{AudioInput, RawBlockCallback};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::dispatcher::Dispatcher;
