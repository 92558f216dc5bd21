use serde::Serialize;
use std::io;
use std::path::PathBuf;
use timelapse_common::config::OutputConfig;
use timelapse_common::frame::{FrameError, FramePayload};
use tracing::info;

use crate::counter::{compute_initial_counter, frame_filename, SequenceCounter};
use crate::storage::{DirStore, FrameStore};

/// One frame successfully persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFrame {
    pub index: u64,
    pub file_name: String,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequencerStatus {
    pub output_dir: PathBuf,
    pub last_index: Option<u64>,
    pub next_file: Option<String>,
    pub frames_written: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("failed to prepare output directory {path}: {source}")]
    Prepare { path: PathBuf, source: io::Error },
    #[error("failed to scan output directory {path}: {source}")]
    Scan { path: PathBuf, source: io::Error },
    #[error("rejected frame for {file_name}: {source}")]
    Payload {
        file_name: String,
        source: FrameError,
    },
    #[error("rejected frame for {file_name}: {mime_type} data does not belong in a .{extension} file")]
    FormatMismatch {
        file_name: String,
        mime_type: &'static str,
        extension: String,
    },
    #[error("failed to write {file_name}: {source}")]
    Write { file_name: String, source: io::Error },
    #[error("frame index space exhausted")]
    Exhausted,
}

/// Assigns each accepted frame the next index and persists it exactly once.
///
/// The counter only moves after the store reports success, so a failed write
/// leaves its index free for the next frame.
#[derive(Debug)]
pub struct FrameSequencer<S = DirStore> {
    store: S,
    counter: SequenceCounter,
    pad_length: usize,
    extension: String,
    frames_written: u64,
}

impl FrameSequencer<DirStore> {
    /// Prepare the output directory and initialize the counter from it.
    pub async fn open(config: &OutputConfig) -> Result<Self, SequenceError> {
        let store = DirStore::new(&config.dir);
        let created = store.ensure_dir().await.map_err(|source| SequenceError::Prepare {
            path: config.dir.clone(),
            source,
        })?;

        let listing = if created || config.overwrite {
            Vec::new()
        } else {
            store.list_names().await.map_err(|source| SequenceError::Scan {
                path: config.dir.clone(),
                source,
            })?
        };
        let counter = compute_initial_counter(listing, &config.extension, config.overwrite);

        info!(
            path = %config.dir.display(),
            overwrite = config.overwrite,
            last_index = ?counter.last(),
            "output directory ready"
        );

        Ok(Self::with_store(
            store,
            counter,
            config.pad_length,
            &config.extension,
        ))
    }
}

impl<S: FrameStore> FrameSequencer<S> {
    pub fn with_store(
        store: S,
        counter: SequenceCounter,
        pad_length: usize,
        extension: &str,
    ) -> Self {
        Self {
            store,
            counter,
            pad_length,
            extension: extension.to_string(),
            frames_written: 0,
        }
    }

    pub fn counter(&self) -> SequenceCounter {
        self.counter
    }

    pub fn next_file_name(&self) -> Option<String> {
        self.counter
            .next_index()
            .map(|index| frame_filename(index, self.pad_length, &self.extension))
    }

    /// Decode and persist one frame under the next index.
    pub async fn accept(&mut self, payload: &FramePayload) -> Result<ExportedFrame, SequenceError> {
        let index = self.counter.next_index().ok_or(SequenceError::Exhausted)?;
        let file_name = frame_filename(index, self.pad_length, &self.extension);

        let frame = match payload.decode() {
            Ok(f) => f,
            Err(source) => return Err(SequenceError::Payload { file_name, source }),
        };

        if !frame.matches_extension(&self.extension) {
            return Err(SequenceError::FormatMismatch {
                file_name,
                mime_type: frame.mime_type(),
                extension: self.extension.clone(),
            });
        }

        if let Err(source) = self.store.put_frame(&file_name, &frame.bytes).await {
            return Err(SequenceError::Write { file_name, source });
        }

        self.counter.advance_to(index);
        self.frames_written += 1;

        Ok(ExportedFrame {
            index,
            file_name,
            size_bytes: frame.bytes.len(),
        })
    }

    pub fn status(&self) -> SequencerStatus {
        SequencerStatus {
            output_dir: self.store.location().to_path_buf(),
            last_index: self.counter.last(),
            next_file: self.next_file_name(),
            frames_written: self.frames_written,
        }
    }
}
