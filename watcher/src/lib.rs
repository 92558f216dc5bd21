//! Change detection for the time-lapse recorder.
//!
//! Raw filesystem events are filtered by an [`IgnoreRule`], debounced per path
//! by a [`SettleQueue`], and turned into a [`ContentChanged`] signal only when
//! the file's SHA-256 fingerprint differs from the previously recorded one.

pub mod detector;
pub mod fingerprint;
pub mod ignore;
pub mod settle;

pub use detector::{ChangeDetector, CheckOutcome, ContentChanged, WatchError, WatchHandle};
pub use fingerprint::{Fingerprint, FingerprintTable, WatchedFile};
pub use ignore::IgnoreRule;
pub use settle::SettleQueue;
