use timelapse_common::frame::FramePayload;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::sequencer::{ExportedFrame, FrameSequencer, SequenceError, SequencerStatus};
use crate::storage::FrameStore;

/// Frames waiting behind the one being written.
const QUEUE_DEPTH: usize = 64;

enum Job {
    Frame {
        payload: FramePayload,
        reply: oneshot::Sender<Result<ExportedFrame, SequenceError>>,
    },
    Status {
        reply: oneshot::Sender<SequencerStatus>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("frame sequencer is not running")]
    Closed,
    #[error(transparent)]
    Rejected(#[from] SequenceError),
}

/// Cloneable entry point to the sequencer task.
///
/// Submissions from any number of callers are queued and handled strictly one
/// at a time, so no two writes ever observe the same counter value.
#[derive(Debug, Clone)]
pub struct SequencerHandle {
    tx: mpsc::Sender<Job>,
}

impl SequencerHandle {
    pub async fn submit(&self, payload: FramePayload) -> Result<ExportedFrame, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job::Frame { payload, reply })
            .await
            .map_err(|_| SubmitError::Closed)?;
        Ok(rx.await.map_err(|_| SubmitError::Closed)??)
    }

    pub async fn status(&self) -> Result<SequencerStatus, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job::Status { reply })
            .await
            .map_err(|_| SubmitError::Closed)?;
        rx.await.map_err(|_| SubmitError::Closed)
    }
}

/// Move `sequencer` onto its own task. The task ends once every handle is dropped.
pub fn spawn_sequencer<S>(
    sequencer: FrameSequencer<S>,
    verbose: bool,
) -> (SequencerHandle, JoinHandle<()>)
where
    S: FrameStore + 'static,
{
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    let task = tokio::spawn(run_sequencer_loop(sequencer, rx, verbose));
    (SequencerHandle { tx }, task)
}

async fn run_sequencer_loop<S: FrameStore>(
    mut sequencer: FrameSequencer<S>,
    mut rx: mpsc::Receiver<Job>,
    verbose: bool,
) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Frame { payload, reply } => {
                let result = sequencer.accept(&payload).await;
                match &result {
                    Ok(frame) => {
                        if verbose {
                            info!(
                                file = frame.file_name,
                                index = frame.index,
                                size = frame.size_bytes,
                                "frame exported"
                            );
                        } else {
                            debug!(file = frame.file_name, index = frame.index, "frame exported");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, encoded_len = payload.encoded_len(), "frame not exported");
                    }
                }
                if reply.send(result).is_err() {
                    debug!("submitter went away before the frame result arrived");
                }
            }
            Job::Status { reply } => {
                if reply.send(sequencer.status()).is_err() {
                    debug!("caller went away before the status arrived");
                }
            }
        }
    }

    info!(
        frames_written = sequencer.status().frames_written,
        "frame sequencer stopped"
    );
}
