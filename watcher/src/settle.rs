use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

/// Per-path quiescence tracking.
///
/// Every raw write event re-arms the path's deadline to `now + threshold`.
/// A path is settled once its deadline has passed without further activity;
/// an editor save that produces several raw events becomes one settled path.
#[derive(Debug)]
pub struct SettleQueue {
    threshold: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl SettleQueue {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            pending: HashMap::new(),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn touch(&mut self, path: &Path, now: Instant) {
        let deadline = now + self.threshold;
        match self.pending.get_mut(path) {
            Some(existing) => *existing = deadline,
            None => {
                self.pending.insert(path.to_path_buf(), deadline);
            }
        }
    }

    /// Remove and return every settled path, earliest deadline first.
    pub fn drain_settled(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut settled: Vec<(Instant, PathBuf)> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, deadline)| (*deadline, path.clone()))
            .collect();
        settled.sort();

        for (_, path) in &settled {
            self.pending.remove(path);
        }
        settled.into_iter().map(|(_, path)| path).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Whether any pending path has settled by `now`.
    pub fn has_settled(&self, now: Instant) -> bool {
        self.next_deadline().is_some_and(|deadline| deadline <= now)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Paths in `event` that count as write activity.
///
/// Creates and modifications count, as does the destination of a rename
/// (editors commonly save by renaming a temp file over the target).
/// Removals, access events, folder creation and rename sources do not.
pub fn write_activity(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => &[],
        EventKind::Create(_) => &event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => &[],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1..).unwrap_or(&[])
        }
        // RenameMode::To / Any / Other: the settled check drops paths that no longer exist.
        EventKind::Modify(_) => &event.paths,
        _ => &[],
    }
}
