//! Frame sequencing: turns each submitted frame into exactly one
//! zero-padded, monotonically numbered image file.

pub mod counter;
pub mod queue;
pub mod sequencer;
pub mod storage;

pub use counter::{compute_initial_counter, frame_filename, SequenceCounter};
pub use queue::{spawn_sequencer, SequencerHandle, SubmitError};
pub use sequencer::{ExportedFrame, FrameSequencer, SequenceError, SequencerStatus};
pub use storage::{DirStore, FrameStore};
