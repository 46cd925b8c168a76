//! # GHST RX
//!
//! Runs the GHST receiver link layer against a serial port.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Set up logging with a non-blocking tracing subscriber
//!    - Load configuration (first argument, default `config/default.toml`)
//!    - Open the receiver port and start the reader/writer tasks
//!
//! 2. **Main Loop**
//!    - Poll the frame status at `poll_rate_hz`, processing when asked
//!    - Log link status periodically
//!    - Record channel snapshots when the recorder is enabled
//!
//! 3. **Graceful Shutdown**
//!    - Ctrl+C stops polling, closes the port and flushes the recorder

use anyhow::{Context, Result};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ghst_rx::config::Config;
use ghst_rx::driver::{FrameState, FrameStatus, GhstReceiver, LinkQuality};
use ghst_rx::ghst::protocol::RSSI_MAX_VALUE;
use ghst_rx::recorder::{ChannelRecord, ChannelRecorder};
use ghst_rx::serial::port_trait::MonotonicClock;
use ghst_rx::serial::SerialOpener;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Frame counters between status log lines
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PollStats {
    polls: u64,
    frames: u64,
    dropped: u64,
}

impl PollStats {
    fn observe(&mut self, status: &FrameStatus) {
        self.polls += 1;
        match status.state {
            FrameState::Complete => self.frames += 1,
            FrameState::Dropped => self.dropped += 1,
            FrameState::Pending => {}
        }
    }
}

fn config_path_from_args<I: IntoIterator<Item = String>>(args: I) -> String {
    args.into_iter()
        .next()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

fn poll_period(poll_rate_hz: u32) -> Duration {
    Duration::from_micros(1_000_000 / poll_rate_hz.max(1) as u64)
}

#[tokio::main]
async fn main() -> Result<()> {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(writer)
        .init();

    info!("GHST RX v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = config_path_from_args(std::env::args().skip(1));
    let config = Config::load(&config_path).with_context(|| format!("Failed to load {}", config_path))?;

    let clock = MonotonicClock::new();
    let mut opener = SerialOpener::new(clock);
    let link_quality = LinkQuality::new();

    let mut rx = GhstReceiver::new(clock)
        .with_failsafe(config.failsafe_tracker())
        .with_scheduler(config.scheduler())
        .with_link_quality_sink(link_quality.clone());

    if !rx.init(&mut opener, &config.port_config()) {
        anyhow::bail!("GHST receiver could not be started, check [serial] in {}", config_path);
    }

    let mut recorder = if config.recorder.enabled {
        Some(ChannelRecorder::new(&config.recorder).context("Failed to start channel recorder")?)
    } else {
        None
    };

    let mut poll = interval(poll_period(config.receiver.poll_rate_hz));
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status_log = interval(Duration::from_millis(config.receiver.status_log_interval_ms));
    let mut record_tick = interval(Duration::from_millis(config.recorder.log_interval_ms));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Polling GHST receiver at {}Hz", config.receiver.poll_rate_hz);
    info!("Press Ctrl+C to exit");

    let mut stats = PollStats::default();
    let mut total = PollStats::default();
    let mut last_status = FrameStatus::new(FrameState::Pending, false, false);

    loop {
        tokio::select! {
            _ = poll.tick() => {
                let status = rx.frame_status();
                stats.observe(&status);
                if status.processing_required {
                    rx.process_frame();
                }
                last_status = status;
            }

            _ = status_log.tick() => {
                info!(
                    "{} frames, {} dropped, failsafe: {}, LQ {}/{}, CH1-4: {:?}us",
                    stats.frames,
                    stats.dropped,
                    last_status.failsafe,
                    link_quality.get(),
                    RSSI_MAX_VALUE,
                    &rx.channels().to_us()[..4]
                );
                total.polls += stats.polls;
                total.frames += stats.frames;
                total.dropped += stats.dropped;
                stats = PollStats::default();
            }

            _ = record_tick.tick(), if recorder.is_some() => {
                let record = ChannelRecord::now(rx.channels(), last_status, rx.link_stats());
                let failed = match recorder.as_mut().map(|r| r.record(&record)) {
                    Some(Err(e)) => {
                        warn!("Channel recorder disabled: {}", e);
                        true
                    }
                    _ => false,
                };
                if failed {
                    recorder = None;
                }
            }

            _ = &mut shutdown => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    rx.shutdown();
    if let Some(mut recorder) = recorder {
        if let Err(e) = recorder.flush() {
            warn!("Failed to flush channel recorder: {}", e);
        }
    }

    info!(
        "Total frames: {}, dropped: {}",
        total.frames + stats.frames,
        total.dropped + stats.dropped
    );

    Ok(())
}
