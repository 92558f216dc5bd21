use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use timelapse_common::config::WatchConfig;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::fingerprint::{fingerprint_file, FingerprintTable};
use crate::ignore::IgnoreRule;
use crate::settle::{write_activity, SettleQueue};

/// Payload-free trigger: some watched file's content genuinely changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentChanged;

/// Result of checking one settled path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Changed,
    Unchanged,
    Empty,
    Missing,
    Directory,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("watch directory {0} does not exist")]
    MissingRoot(PathBuf),
    #[error("watch path {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("failed to resolve watch directory {0}: {1}")]
    Resolve(PathBuf, io::Error),
    #[error("invalid ignore pattern: {0}")]
    IgnorePattern(#[from] regex::Error),
    #[error("failed to start file watcher: {0}")]
    Notify(#[from] notify::Error),
}

/// Turns raw filesystem events under one root into deduplicated
/// [`ContentChanged`] signals.
#[derive(Debug)]
pub struct ChangeDetector {
    root: PathBuf,
    ignore: IgnoreRule,
    table: FingerprintTable,
    settle: SettleQueue,
}

impl ChangeDetector {
    /// Validate `root` and build a detector for it. The root is canonicalized
    /// so ignore matching lines up with the absolute paths the OS reports.
    pub fn new(root: &Path, ignore: IgnoreRule, threshold: Duration) -> Result<Self, WatchError> {
        let meta = match std::fs::metadata(root) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(WatchError::MissingRoot(root.to_path_buf()))
            }
            Err(e) => return Err(WatchError::Resolve(root.to_path_buf(), e)),
        };
        if !meta.is_dir() {
            return Err(WatchError::NotADirectory(root.to_path_buf()));
        }
        let root = root
            .canonicalize()
            .map_err(|e| WatchError::Resolve(root.to_path_buf(), e))?;

        Ok(Self {
            root,
            ignore,
            table: FingerprintTable::new(),
            settle: SettleQueue::new(threshold),
        })
    }

    pub fn from_config(config: &WatchConfig) -> Result<Self, WatchError> {
        let ignore = IgnoreRule::new(&config.ignore)?;
        Self::new(
            &config.dir,
            ignore,
            Duration::from_millis(config.stability_threshold_ms),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tracked_files(&self) -> usize {
        self.table.len()
    }

    pub fn pending(&self) -> usize {
        self.settle.len()
    }

    /// Feed one raw event into the settle queue.
    pub fn observe(&mut self, event: &Event, now: Instant) {
        for path in write_activity(event) {
            if self.ignore.is_ignored(&self.root, path) {
                trace!(path = %path.display(), "ignored path");
                continue;
            }
            trace!(path = %path.display(), kind = ?event.kind, "write activity");
            self.settle.touch(path, now);
        }
    }

    /// Check every path settled by `now`, sending one signal per genuine change.
    /// Returns the number of signals sent.
    pub async fn tick(
        &mut self,
        now: Instant,
        changes: &mpsc::UnboundedSender<ContentChanged>,
    ) -> usize {
        let mut sent = 0;
        for path in self.settle.drain_settled(now) {
            if self.check(&path).await != CheckOutcome::Changed {
                continue;
            }
            if changes.send(ContentChanged).is_err() {
                debug!("change receiver dropped, signal discarded");
                continue;
            }
            sent += 1;
        }
        sent
    }

    /// Fingerprint `path` and compare it against the last recorded fingerprint.
    ///
    /// Read failures are logged and reported as [`CheckOutcome::Failed`]; they
    /// are never retried.
    pub async fn check(&mut self, path: &Path) -> CheckOutcome {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => return CheckOutcome::Directory,
            Ok(meta) if meta.len() == 0 => {
                debug!(path = %path.display(), "zero-byte file, not yet written");
                return CheckOutcome::Empty;
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "file vanished before it settled");
                return CheckOutcome::Missing;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to stat file, dropping event");
                return CheckOutcome::Failed;
            }
        }

        let fingerprint = match fingerprint_file(path).await {
            Ok(Some(fp)) => fp,
            Ok(None) => return CheckOutcome::Empty,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to fingerprint file, dropping event");
                return CheckOutcome::Failed;
            }
        };

        if self.table.record(path, fingerprint, SystemTime::now()) {
            info!(path = %path.display(), fingerprint = %fingerprint, "content changed");
            CheckOutcome::Changed
        } else {
            debug!(path = %path.display(), "content unchanged");
            CheckOutcome::Unchanged
        }
    }

    /// Subscribe to the OS watcher and run the detector on its own task.
    ///
    /// Fails immediately if the root is missing or the subscription cannot be
    /// established.
    pub fn watch(
        self,
        poll_interval: Duration,
        changes: mpsc::UnboundedSender<ContentChanged>,
    ) -> Result<WatchHandle, WatchError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if events_tx.send(res).is_err() {
                    debug!("detector task is gone, dropping file event");
                }
            },
            Config::default(),
        )?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        info!(
            root = %self.root.display(),
            threshold_ms = self.settle_threshold_ms(),
            "watching for content changes"
        );

        let task = tokio::spawn(self.run(events_rx, stop_rx, poll_interval, changes));

        Ok(WatchHandle {
            _watcher: watcher,
            stop_tx: Some(stop_tx),
            task,
        })
    }

    fn settle_threshold_ms(&self) -> u64 {
        self.settle.threshold().as_millis() as u64
    }

    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        mut stop: oneshot::Receiver<()>,
        poll_interval: Duration,
        changes: mpsc::UnboundedSender<ContentChanged>,
    ) {
        let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    debug!("stopping change detector");
                    break;
                }
                maybe_event = events.recv() => match maybe_event {
                    Some(Ok(event)) => self.observe(&event, Instant::now()),
                    Some(Err(e)) => warn!(error = %e, "file watcher error"),
                    None => break,
                },
                _ = ticker.tick() => {
                    let now = Instant::now();
                    if self.settle.has_settled(now) {
                        self.tick(now, &changes).await;
                    }
                }
            }
        }

        info!(tracked = self.table.len(), "change detector stopped");
    }
}

/// Live watch subscription. Dropping it stops the OS watcher; [`shutdown`]
/// additionally waits for the detector task to finish.
///
/// [`shutdown`]: WatchHandle::shutdown
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Err(e) = self.task.await {
            error!(error = %e, "change detector task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::DOTFILES;
    use notify::event::{DataChange, EventKind, ModifyKind, RemoveKind};

    const THRESHOLD: Duration = Duration::from_millis(200);

    fn detector(root: &Path) -> ChangeDetector {
        ChangeDetector::new(root, IgnoreRule::new(DOTFILES).unwrap(), THRESHOLD).unwrap()
    }

    fn modified(path: &Path) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(path.to_path_buf())
    }

    #[tokio::test]
    async fn identical_resave_is_not_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut det = detector(dir.path());
        let path = det.root().join("sketch.ts");

        std::fs::write(&path, b"draw()").unwrap();
        assert_eq!(det.check(&path).await, CheckOutcome::Changed);
        std::fs::write(&path, b"draw()").unwrap();
        assert_eq!(det.check(&path).await, CheckOutcome::Unchanged);
    }

    #[tokio::test]
    async fn changing_back_signals_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut det = detector(dir.path());
        let path = det.root().join("sketch.ts");

        for content in [&b"a"[..], b"b", b"a"] {
            std::fs::write(&path, content).unwrap();
            assert_eq!(det.check(&path).await, CheckOutcome::Changed);
        }
        assert_eq!(det.tracked_files(), 1);
    }

    #[tokio::test]
    async fn zero_byte_file_never_signals() {
        let dir = tempfile::tempdir().unwrap();
        let mut det = detector(dir.path());
        let path = det.root().join("new.ts");
        std::fs::write(&path, b"").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let t0 = Instant::now();
        det.observe(&modified(&path), t0);
        assert_eq!(det.tick(t0 + THRESHOLD, &tx).await, 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(det.tracked_files(), 0);
    }

    #[tokio::test]
    async fn missing_and_directory_paths_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut det = detector(dir.path());
        let sub = det.root().join("lib");
        std::fs::create_dir(&sub).unwrap();

        assert_eq!(det.check(&sub).await, CheckOutcome::Directory);
        let gone = det.root().join("gone.ts");
        assert_eq!(det.check(&gone).await, CheckOutcome::Missing);
    }

    #[tokio::test]
    async fn burst_of_raw_events_yields_one_signal() {
        let dir = tempfile::tempdir().unwrap();
        let mut det = detector(dir.path());
        let path = det.root().join("sketch.ts");
        std::fs::write(&path, b"circle(10)").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let t0 = Instant::now();
        for i in 0..5 {
            det.observe(&modified(&path), t0 + Duration::from_millis(i * 20));
        }
        assert_eq!(det.pending(), 1);
        assert_eq!(det.tick(t0 + Duration::from_millis(100), &tx).await, 0);
        assert_eq!(det.tick(t0 + Duration::from_millis(400), &tx).await, 1);

        assert_eq!(rx.try_recv().unwrap(), ContentChanged);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ignored_and_removed_paths_never_settle() {
        let dir = tempfile::tempdir().unwrap();
        let mut det = detector(dir.path());
        let hidden = det.root().join(".sketch.ts.swp");
        std::fs::write(&hidden, b"swap").unwrap();
        let visible = det.root().join("sketch.ts");

        det.observe(&modified(&hidden), Instant::now());
        det.observe(
            &Event::new(EventKind::Remove(RemoveKind::File)).add_path(visible),
            Instant::now(),
        );
        assert_eq!(det.pending(), 0);
    }

    /// Wait up to `window` for signals, counting them.
    async fn signals_within(
        rx: &mut mpsc::UnboundedReceiver<ContentChanged>,
        window: Duration,
    ) -> usize {
        let deadline = Instant::now() + window;
        let mut count = 0;
        while let Ok(Some(_)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            count += 1;
        }
        count
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn live_watch_signals_real_changes_and_stops_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let det = ChangeDetector::new(
            dir.path(),
            IgnoreRule::new(DOTFILES).unwrap(),
            Duration::from_millis(100),
        )
        .unwrap();
        let root = det.root().to_path_buf();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = det.watch(Duration::from_millis(20), tx).unwrap();

        let sketch = root.join("sketch.ts");
        std::fs::write(&sketch, b"rect(0, 0, 10, 10)").unwrap();
        assert_eq!(signals_within(&mut rx, Duration::from_millis(1500)).await, 1);

        std::fs::write(&sketch, b"rect(0, 0, 10, 10)").unwrap();
        assert_eq!(signals_within(&mut rx, Duration::from_millis(600)).await, 0);

        std::fs::write(root.join("empty.ts"), b"").unwrap();
        std::fs::write(root.join(".sketch.ts.swp"), b"swap").unwrap();
        assert_eq!(signals_within(&mut rx, Duration::from_millis(600)).await, 0);

        handle.shutdown().await;
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn missing_root_is_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ChangeDetector::new(
            &dir.path().join("nope"),
            IgnoreRule::new(DOTFILES).unwrap(),
            THRESHOLD,
        )
        .unwrap_err();
        assert!(matches!(err, WatchError::MissingRoot(_)));
    }

    #[test]
    fn file_root_is_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.ts");
        std::fs::write(&file, b"x").unwrap();
        let err =
            ChangeDetector::new(&file, IgnoreRule::new(DOTFILES).unwrap(), THRESHOLD).unwrap_err();
        assert!(matches!(err, WatchError::NotADirectory(_)));
    }

    #[test]
    fn bad_ignore_pattern_fails_setup() {
        let dir = tempfile::tempdir().unwrap();
        let config = WatchConfig {
            dir: dir.path().to_path_buf(),
            ignore: "(".into(),
            ..WatchConfig::default()
        };
        assert!(matches!(
            ChangeDetector::from_config(&config),
            Err(WatchError::IgnorePattern(_))
        ));
    }
}
