use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use tokio::sync::mpsc;
use url::Url;

use intersection_viz::reconciler::{ExpiryPolicy, Reconciler, ReconcilerConfig};
use intersection_viz::renderer::{CsvRecorder, LogRenderer};
use intersection_viz::session::Session;
use intersection_viz::transport::Source;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum PolicyArg {
    /// Expire on elapsed time alone
    Elapsed,
    /// Never expire an object listed in the latest batch
    ElapsedAndAbsent,
}

impl From<PolicyArg> for ExpiryPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Elapsed => ExpiryPolicy::Elapsed,
            PolicyArg::ElapsedAndAbsent => ExpiryPolicy::ElapsedAndAbsent,
        }
    }
}

/// Draws the objects an intersection tracker reports.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Base URL of the tracking server, ws:// for websocket or http:// for
    /// server-sent events
    #[arg(long, default_value = "ws://localhost:8000/")]
    url: String,

    /// Stream path, relative to --url
    #[arg(long, default_value = "stream")]
    path: String,

    /// Replay newline-delimited JSON messages from a file instead of connecting
    #[arg(long, conflicts_with = "demo")]
    replay: Option<PathBuf>,

    /// Generate synthetic tracking frames instead of connecting
    #[arg(long)]
    demo: bool,

    /// Milliseconds an object may go unreported before it is removed
    #[arg(long, default_value_t = 500)]
    expiry_ms: u64,

    #[arg(long, value_enum, default_value_t = PolicyArg::Elapsed)]
    expiry_policy: PolicyArg,

    /// Frames per second
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=1000))]
    fps: u32,

    /// Delay before reconnecting a dropped stream
    #[arg(long, default_value_t = 3000)]
    reconnect_ms: u64,

    /// Delay between replayed or synthetic messages
    #[arg(long, default_value_t = 200)]
    interval_ms: u64,

    /// Record every renderer effect to this CSV file
    #[arg(long)]
    record: Option<PathBuf>,
}

impl Args {
    fn source(&self) -> Result<Source> {
        let interval = Duration::from_millis(self.interval_ms);
        if let Some(path) = &self.replay {
            return Ok(Source::Replay {
                path: path.clone(),
                interval,
            });
        }
        if self.demo {
            return Ok(Source::Demo { interval });
        }
        let base = Url::parse(&self.url).with_context(|| format!("invalid url {}", self.url))?;
        let url = base.join(&self.path)?;
        Ok(Source::Stream {
            url,
            reconnect_delay: Duration::from_millis(self.reconnect_ms),
        })
    }

    fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            expiry_window: Duration::from_millis(self.expiry_ms),
            expiry_policy: self.expiry_policy.into(),
            ..ReconcilerConfig::default()
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let source = args.source()?;
    let recorder = args.record.as_deref().map(CsvRecorder::from_path).transpose()?;
    let reconciler = Reconciler::new(args.reconciler_config());
    info!("source: {source:?}");

    let (tx, rx) = mpsc::channel(64);
    let transport = source.spawn(tx);
    let session = Session::new(reconciler, (LogRenderer::default(), recorder));
    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(args.fps));

    let ((_, recorder), stats) = session.run(rx, frame_interval, shutdown_signal()).await;
    info!(
        "{} messages ({} malformed, {} entries rejected) over {} frames",
        stats.messages, stats.malformed, stats.rejected_entries, stats.ticks
    );

    if let Some(recorder) = recorder {
        recorder.finish()?;
    }
    if transport.is_finished() {
        transport.await??;
    } else {
        transport.abort();
    }

    Ok(())
}
