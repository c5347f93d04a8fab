mod clock;
mod config;
mod controller;
mod error;
mod ethernet;
mod frame;
mod homeplug;
mod keys;
mod link;
mod mac;
mod messages;
mod observer;
mod session;
mod sound;
mod stats;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::Mutex;
use tracing::info;

use config::Config;
use controller::SessionController;
use link::RawLink;
use observer::{CpEvent, Observer, TracingObserver};
use session::{SessionTimeouts, SlacSession};
use stats::Stats;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse().resolved();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone())),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .init();

    info!(
        interface = %config.interface,
        evse_id = %config.evse_id,
        slac_init_timeout = config.slac_init_timeout,
        "slac-evse-matcher starting"
    );

    let stats = Stats::new();
    tokio::spawn(stats::stats_reporter(Arc::clone(&stats), config.stats_interval_secs));

    let link = Arc::new(RawLink::open(&config.interface)?);
    let session = Arc::new(Mutex::new(SlacSession::new(
        Arc::clone(&link),
        config.evse_id.clone(),
        Arc::clone(&stats),
    )));

    session.lock().await.set_key().await?;
    info!(evse_id = %config.evse_id, "chip provisioned, ready for matching");

    let observer: Arc<dyn Observer> = Arc::new(TracingObserver);
    let timeouts = SessionTimeouts {
        slac_init: Duration::from_secs_f64(config.slac_init_timeout),
        atten_results_override: config.atten_results_timeout.map(Duration::from_millis),
    };
    let mut controller = SessionController::new(
        Arc::clone(&session),
        observer,
        Arc::clone(&stats),
        config.evse_id.clone(),
        timeouts,
    );

    let (cp_tx, mut cp_rx) = tokio::sync::mpsc::unbounded_channel::<CpEvent>();
    if config.cp_stdin {
        let tx = cp_tx.clone();
        let default_evse_id = config.evse_id.clone();
        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut lines = tokio::io::BufReader::new(stdin).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let mut parts = line.split_whitespace();
                let Some(state) = parts.next() else { continue };
                let evse_id = parts.next().map(str::to_string).unwrap_or_else(|| default_evse_id.clone());
                if tx.send(CpEvent { state: state.to_string(), evse_id }).is_err() {
                    break;
                }
            }
        });
    }

    // With cp_stdin off, no producer ever sends on cp_rx and this loop
    // simply parks — a real deployment wires its own CP-state source into
    // the same cp_tx/cp_rx pair without touching the controller.
    while let Some(event) = cp_rx.recv().await {
        controller.handle_cp_event(event).await;
    }

    Ok(())
}
