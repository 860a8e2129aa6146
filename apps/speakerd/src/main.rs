//! Flockcast speaker daemon.
//!
//! Runs three concurrent activities sharing one [`flockcast_core::ClusterView`]:
//! an announcer loop, a listener loop, and the TCP control server.

mod config;

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use flockcast_core::{
    net, Announcer, ClusterView, ControlServer, ReferenceClock, Shutdown,
};

use crate::config::SpeakerConfig;

/// Flockcast speaker daemon - joins the time-sync gossip and serves the
/// upload/query-time/start-at control protocol.
#[derive(Parser, Debug)]
#[command(name = "speakerd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "FLOCKCAST_LOG_LEVEL")]
    log_level: log::LevelFilter,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("speakerd v{}", env!("CARGO_PKG_VERSION"));

    let config = SpeakerConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    // Resolving against a unicast, non-routed probe address is enough to
    // learn which local interface the kernel would pick for LAN traffic,
    // without needing SO_BROADCAST on a throwaway socket (UDP `connect`
    // never actually sends a packet).
    const ROUTE_PROBE: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(198, 51, 100, 1), 9);
    let my_ip =
        net::resolve_local_ip(ROUTE_PROBE).context("failed to resolve this node's local IPv4 address")?;
    let broadcast_destination = SocketAddrV4::new(
        config.broadcast_addr.unwrap_or_else(|| net::broadcast_addr_for(my_ip)),
        config.timesync_port,
    );

    log::info!(
        "speakerd: local_ip={} broadcast={} control_port={}",
        my_ip,
        broadcast_destination,
        config.control_port
    );

    let view = ClusterView::new();
    let shutdown = Shutdown::new();

    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            log::info!("speakerd: shutdown signal received");
            shutdown.signal();
        })
        .context("failed to install signal handler")?;
    }

    let reference_clock = ReferenceClock::new(view.clone(), my_ip);
    let sink = build_sink(&config.audio_device);

    let announcer = Announcer::bind(broadcast_destination, view.clone(), shutdown.clone())
        .context("failed to bind announcer socket")?;
    let listener =
        flockcast_core::listener::Listener::bind(view.clone(), my_ip, shutdown.clone())
            .context("failed to bind listener socket")?;
    let control_server = ControlServer::bind(
        SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.control_port),
        reference_clock,
        sink,
        shutdown.clone(),
    )
    .context("failed to bind control server")?;

    let announcer_handle = thread::spawn(move || announcer.run());
    let listener_handle = thread::spawn(move || listener.run());
    let control_handle = thread::spawn(move || control_server.run());

    announcer_handle.join().expect("announcer thread panicked");
    listener_handle.join().expect("listener thread panicked");
    control_handle.join().expect("control server thread panicked");

    log::info!("speakerd: shut down cleanly");
    Ok(())
}

/// Builds the audio sink appropriate for this platform: a real OSS device on
/// Linux, a logging no-op everywhere else (no OSS-equivalent ioctl sequence
/// exists for other platforms).
#[cfg(target_os = "linux")]
fn build_sink(audio_device: &std::path::Path) -> Arc<dyn flockcast_core::AudioSink> {
    Arc::new(flockcast_core::sink::OssSink::new(
        audio_device.to_string_lossy().to_string(),
    ))
}

#[cfg(not(target_os = "linux"))]
fn build_sink(_audio_device: &std::path::Path) -> Arc<dyn flockcast_core::AudioSink> {
    Arc::new(flockcast_core::NullSink)
}
