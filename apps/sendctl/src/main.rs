//! Flockcast controller ("sendctl"): discovers the cluster, uploads a song,
//! queries the reference clock, and starts synchronized playback.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use flockcast_core::controller::{
    connect_all, discover, load_song, plan_start, query_reference_time, start_at_all, upload_all,
    PeerOutcome,
};

use crate::config::SenderConfig;

/// Flockcast controller - uploads a song to every discovered speaker and
/// starts them all at the same reference-clock instant.
#[derive(Parser, Debug)]
#[command(name = "sendctl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the ADTS-framed AAC file to play.
    song_path: PathBuf,

    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "FLOCKCAST_LOG_LEVEL")]
    log_level: log::LevelFilter,
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("sendctl: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = SenderConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    log::info!("sendctl v{}", env!("CARGO_PKG_VERSION"));

    // Step 1: discover the peer set from one broadcast announcement.
    let peers = discover(Duration::from_millis(config.discover_timeout_ms))
        .context("speaker discovery failed")?;
    log::info!("sendctl: discovered {} peer(s)", peers.len());

    // Step 2: load the song fully into memory.
    let song =
        load_song(&args.song_path).with_context(|| format!("failed to read {}", args.song_path.display()))?;
    log::info!("sendctl: loaded {} bytes from {}", song.len(), args.song_path.display());

    // Step 3: connect to each discovered peer; dead connects are skipped,
    // not fatal.
    let mut conns = connect_all(&peers);
    let live_count = conns.iter().filter(|c| c.is_live()).count();
    if live_count == 0 {
        anyhow::bail!("no discovered peer accepted a connection");
    }

    // Step 4: upload to every live peer.
    let upload_outcomes = upload_all(&mut conns, &song);
    log_outcomes("upload", &upload_outcomes);

    // Step 5: query the reference clock from the first live peer.
    let t0 = query_reference_time(&mut conns).context("failed to query the reference clock")?;

    // Step 6: compute the synchronized start instant.
    let t_start = plan_start(t0);
    log::info!("sendctl: T0={} T_start={} (headroom applied)", t0, t_start);

    // Step 7: fan out the start-at command to every connected peer.
    let start_outcomes = start_at_all(&mut conns, t_start);
    log_outcomes("start-at", &start_outcomes);

    let started = start_outcomes.iter().filter(|o| o.is_ok()).count();
    log::info!("sendctl: {}/{} peer(s) scheduled to start", started, peers.len());

    Ok(())
}

fn log_outcomes(phase: &str, outcomes: &[PeerOutcome]) {
    for outcome in outcomes {
        match &outcome.error {
            None => log::debug!("sendctl: {} succeeded for {}", phase, outcome.ip),
            Some(err) => log::warn!("sendctl: {} failed for {}: {}", phase, outcome.ip, err),
        }
    }
}
