//! Deterministic stand-ins for the platform and service boundaries.
//!
//! Used by this crate's unit tests and by the binary when no hardware
//! backend exists for the target.

mod manual_input;
mod recording;
mod synthetic;

pub use manual_input::{InputCounts, ManualInput};
pub use recording::{RecordingDelegate, RecordingDispatcher, Submission};
pub use synthetic::SyntheticInput;
