mod app;
mod socket;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use app::AppState;
use timelapse_common::config::Config;
use timelapse_sequencer::{spawn_sequencer, FrameSequencer};
use timelapse_watcher::ChangeDetector;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Grace period for queued frames to finish writing after the server stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    let config = match Config::load_or_default(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        watch_dir = %config.watch.dir.display(),
        output_dir = %config.output.dir.display(),
        overwrite = config.output.overwrite,
        pad_length = config.output.pad_length,
        stability_threshold_ms = config.watch.stability_threshold_ms,
        bind = config.server.bind,
        "starting timelapse server"
    );

    // Output directory and counter come first so no signal is sent before frames can land.
    let sequencer = match FrameSequencer::open(&config.output).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to prepare output directory");
            std::process::exit(1);
        }
    };
    let (sequencer_handle, sequencer_task) = spawn_sequencer(sequencer, config.logging.verbose);

    let detector = match ChangeDetector::from_config(&config.watch) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "failed to set up change detection");
            std::process::exit(1);
        }
    };
    let (change_tx, change_rx) = mpsc::unbounded_channel();
    let watch = match detector.watch(
        Duration::from_millis(config.watch.poll_interval_ms),
        change_tx,
    ) {
        Ok(w) => w,
        Err(e) => {
            error!(error = %e, "failed to start watching");
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::new(sequencer_handle, config.logging.verbose));
    tokio::spawn(app::forward_changes(change_rx, state.changes.clone()));

    let listener = match tokio::net::TcpListener::bind(&config.server.bind).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, bind = config.server.bind, "failed to bind control channel");
            std::process::exit(1);
        }
    };
    info!(addr = config.server.bind, "control channel listening on /timelapse");

    if let Err(e) = axum::serve(listener, app::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
    }

    watch.shutdown().await;
    if tokio::time::timeout(DRAIN_TIMEOUT, sequencer_task).await.is_err() {
        warn!("frame sequencer still busy at exit");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
