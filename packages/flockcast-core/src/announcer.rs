//! Periodic broadcast of this node's view of the cluster.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use crate::cluster::ClusterView;
use crate::constants::ANNOUNCE_INTERVAL_SECS;
use crate::net;
use crate::protocol::AnnouncementFrame;
use crate::shutdown::Shutdown;
use crate::time::now_us;

/// Granularity at which the announcer re-checks the shutdown flag while
/// waiting out the announce interval.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Broadcasts an [`AnnouncementFrame`] every [`ANNOUNCE_INTERVAL_SECS`].
pub struct Announcer {
    socket: UdpSocket,
    destination: SocketAddrV4,
    view: ClusterView,
    shutdown: Shutdown,
}

impl Announcer {
    /// Binds a broadcast-capable UDP socket and prepares to announce to
    /// `destination` (typically the LAN broadcast address on the
    /// time-sync port).
    pub fn bind(
        destination: SocketAddrV4,
        view: ClusterView,
        shutdown: Shutdown,
    ) -> std::io::Result<Self> {
        let socket = net::new_udp_socket(
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            true,
            true,
            Some(SHUTDOWN_POLL_INTERVAL),
        )?;
        Ok(Self {
            socket,
            destination,
            view,
            shutdown,
        })
    }

    /// Runs the announce loop until shutdown is signaled.
    ///
    /// A send failure is treated as peer-transient: it's logged and the
    /// loop continues rather than aborting.
    pub fn run(&self) {
        log::info!("announcer: broadcasting to {}", self.destination);
        while !self.shutdown.is_signaled() {
            self.announce_once();
            self.wait_for_next_tick();
        }
        log::info!("announcer: shut down");
    }

    fn announce_once(&self) {
        let frame = AnnouncementFrame::new(now_us(), self.view.snapshot_tds());
        let encoded = frame.encode();
        match self.socket.send_to(&encoded, self.destination) {
            Ok(_) => log::debug!(
                "announcer: sent announcement ({} peer entries)",
                frame.machines.len()
            ),
            Err(e) => log::warn!("announcer: send failed: {}", e),
        }
    }

    fn wait_for_next_tick(&self) {
        let deadline = Duration::from_secs(ANNOUNCE_INTERVAL_SECS);
        let mut waited = Duration::ZERO;
        while waited < deadline && !self.shutdown.is_signaled() {
            let step = SHUTDOWN_POLL_INTERVAL.min(deadline - waited);
            std::thread::sleep(step);
            waited += step;
        }
    }
}
