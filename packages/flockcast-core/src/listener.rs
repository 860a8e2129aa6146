//! Ingests broadcast announcement frames and updates the cluster view.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::ClusterView;
use crate::constants::TIMESYNC_PORT;
use crate::net;
use crate::protocol::{AnnouncementFrame, ANNOUNCEMENT_FRAME_LEN};
use crate::shutdown::Shutdown;
use crate::time::now_us;

/// Socket read timeout, bounding how quickly the listener notices shutdown.
const READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Receives UDP announcement frames on [`TIMESYNC_PORT`] and feeds them
/// into a [`ClusterView`].
pub struct Listener {
    socket: UdpSocket,
    view: ClusterView,
    my_ip: Ipv4Addr,
    shutdown: Shutdown,
    corrupt_frames: Arc<AtomicU64>,
}

impl Listener {
    /// Binds `ANY:TIMESYNC_PORT` with `SO_REUSEADDR`/`SO_REUSEPORT`/broadcast.
    pub fn bind(view: ClusterView, my_ip: Ipv4Addr, shutdown: Shutdown) -> std::io::Result<Self> {
        let socket = net::new_udp_socket(
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, TIMESYNC_PORT),
            true,
            true,
            Some(READ_TIMEOUT),
        )?;
        Ok(Self {
            socket,
            view,
            my_ip,
            shutdown,
            corrupt_frames: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Number of datagrams dropped for wrong size or bad magic so far.
    pub fn corrupt_frame_count(&self) -> u64 {
        self.corrupt_frames.load(Ordering::Relaxed)
    }

    /// Runs the receive loop until shutdown is signaled.
    pub fn run(&self) {
        log::info!("listener: bound on 0.0.0.0:{}", TIMESYNC_PORT);
        let mut buf = [0u8; ANNOUNCEMENT_FRAME_LEN + 1];
        while !self.shutdown.is_signaled() {
            match self.socket.recv_from(&mut buf) {
                Ok((len, src)) => self.handle_datagram(&buf[..len], src.ip()),
                Err(e) if would_block(&e) => continue,
                Err(e) => {
                    log::warn!("listener: recv error: {}", e);
                }
            }
        }
        log::info!("listener: shut down");
    }

    fn handle_datagram(&self, bytes: &[u8], src_ip: std::net::IpAddr) {
        let src_ip = match src_ip {
            std::net::IpAddr::V4(ip) => ip,
            std::net::IpAddr::V6(_) => return,
        };

        let frame = match AnnouncementFrame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                self.corrupt_frames.fetch_add(1, Ordering::Relaxed);
                log::warn!("listener: dropping corrupt frame from {}: {}", src_ip, e);
                return;
            }
        };

        let local_rx = now_us();
        self.view.record_sample(src_ip, local_rx, frame.ts);

        if let Some(entry) = frame.machines.iter().find(|m| m.ip == self.my_ip) {
            self.view.record_peer_reported_delta(src_ip, entry.td);
        }
    }
}

fn would_block(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket as StdUdpSocket;
    use std::thread;

    #[test]
    fn decodes_valid_frame_and_updates_view() {
        let view = ClusterView::new();
        let my_ip = Ipv4Addr::new(127, 0, 0, 1);
        let shutdown = Shutdown::new();
        let listener = Listener::bind(view.clone(), my_ip, shutdown.clone()).unwrap();
        let bound_port = listener.socket.local_addr().unwrap().port();

        let handle = thread::spawn(move || listener.run());

        let sender = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        let frame = AnnouncementFrame::new(now_us() - 1_000, vec![(my_ip, 777)]);
        sender
            .send_to(&frame.encode(), ("127.0.0.1", bound_port))
            .unwrap();

        // Give the listener thread a moment to process the datagram.
        thread::sleep(Duration::from_millis(300));
        shutdown.signal();
        handle.join().unwrap();

        assert_eq!(view.peer_count(), 1);
        let loopback: Ipv4Addr = sender.local_addr().unwrap().ip().to_string().parse().unwrap();
        assert!(view.td_for(loopback) != i64::MAX);
    }

    #[test]
    fn drops_wrong_size_datagram() {
        let view = ClusterView::new();
        let shutdown = Shutdown::new();
        let listener =
            Listener::bind(view.clone(), Ipv4Addr::new(127, 0, 0, 1), shutdown.clone()).unwrap();
        let bound_port = listener.socket.local_addr().unwrap().port();

        let handle = thread::spawn(move || listener.run());
        let sender = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[1, 2, 3], ("127.0.0.1", bound_port)).unwrap();
        thread::sleep(Duration::from_millis(300));
        shutdown.signal();
        handle.join().unwrap();

        assert_eq!(view.peer_count(), 0);
    }
}
