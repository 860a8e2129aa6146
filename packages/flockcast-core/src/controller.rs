//! Controller / sender side of the three-phase distribute/query/schedule
//! protocol.
//!
//! The controller is intentionally single-threaded and sequential: it
//! blocks on each socket call in turn (discover, then connect-all, then
//! upload-all, then query, then start-at-all). Per-peer failures are
//! collected rather than aborting the run, so a missing speaker never
//! prevents the reachable ones from starting together.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpStream};
use std::path::Path;
use std::time::Duration;

use crate::constants::{CONTROL_PORT, START_HEADROOM_US, TIMESYNC_PORT};
use crate::error::{ControlError, DiscoverError};
use crate::net;
use crate::protocol::{decode_timestamp, encode_header, encode_timestamp, Command};
use crate::protocol::{AnnouncementFrame, ANNOUNCEMENT_FRAME_LEN};

/// Per-peer result of a fan-out operation (connect, upload, or start-at).
#[derive(Debug, Clone)]
pub struct PeerOutcome {
    pub ip: Ipv4Addr,
    pub error: Option<String>,
}

impl PeerOutcome {
    fn ok(ip: Ipv4Addr) -> Self {
        Self { ip, error: None }
    }

    fn failed(ip: Ipv4Addr, error: impl ToString) -> Self {
        Self {
            ip,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A peer discovered during the fan-out phase, along with its TCP
/// connection if one was successfully established. A connect failure
/// leaves `stream` as `None`; the peer is then skipped by every later
/// phase rather than aborting the run.
pub struct PeerConnection {
    pub ip: Ipv4Addr,
    stream: Option<TcpStream>,
}

impl PeerConnection {
    pub fn is_live(&self) -> bool {
        self.stream.is_some()
    }
}

/// Discovers the cluster's peer set by listening for one announcement
/// frame.
///
/// Binds `ANY:TIMESYNC_PORT` with broadcast + reuse options, exactly like
/// the speaker daemon's listener, and returns as soon as one valid frame
/// arrives. `timeout` bounds how long discovery will wait before giving up.
pub fn discover(timeout: Duration) -> Result<Vec<Ipv4Addr>, DiscoverError> {
    let socket = net::new_udp_socket(
        SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, TIMESYNC_PORT),
        true,
        true,
        Some(timeout),
    )
    .map_err(DiscoverError::SocketBind)?;

    let mut buf = [0u8; ANNOUNCEMENT_FRAME_LEN + 1];
    loop {
        match socket.recv_from(&mut buf) {
            Ok((len, _src)) => match AnnouncementFrame::decode(&buf[..len]) {
                Ok(frame) => {
                    let peers: Vec<Ipv4Addr> =
                        frame.machines.iter().map(|m| m.ip).collect();
                    return Ok(peers);
                }
                Err(e) => {
                    log::warn!("discover: dropping invalid announcement: {}", e);
                    continue;
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(DiscoverError::Timeout)
            }
            Err(e) => return Err(DiscoverError::SocketBind(e)),
        }
    }
}

/// Reads the full contents of the file at `path` into memory.
///
/// File loading is an opaque external collaborator; this is a
/// thin wrapper so callers have one place to swap in a different source.
pub fn load_song(path: &Path) -> std::io::Result<Vec<u8>> {
    std::fs::read(path)
}

/// Opens a TCP connection to each discovered peer's control port.
///
/// Peers that refuse the connection are kept in the returned list with
/// `stream = None` so later phases can skip them uniformly.
pub fn connect_all(peers: &[Ipv4Addr]) -> Vec<PeerConnection> {
    peers
        .iter()
        .map(|&ip| {
            let addr = SocketAddrV4::new(ip, CONTROL_PORT);
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    // Small header writes shouldn't incur Nagle delay that
                    // eats into the start headroom.
                    if let Err(e) = stream.set_nodelay(true) {
                        log::warn!("connect_all: failed to set TCP_NODELAY for {}: {}", ip, e);
                    }
                    PeerConnection {
                        ip,
                        stream: Some(stream),
                    }
                }
                Err(e) => {
                    log::warn!("connect_all: connect to {} failed: {}", ip, e);
                    PeerConnection { ip, stream: None }
                }
            }
        })
        .collect()
}

/// Uploads `song` (cmd=1) to every connected peer.
///
/// A write failure marks that peer dead (drops its connection) and the
/// upload continues with the remaining peers.
pub fn upload_all(conns: &mut [PeerConnection], song: &[u8]) -> Vec<PeerOutcome> {
    let arg = match u32::try_from(song.len()) {
        Ok(v) => v,
        Err(_) => {
            log::error!("upload_all: song of {} bytes exceeds u32::MAX", song.len());
            return conns
                .iter()
                .map(|c| PeerOutcome::failed(c.ip, "song too large to encode in arg field"))
                .collect();
        }
    };

    conns
        .iter_mut()
        .map(|conn| {
            if !conn.is_live() {
                return PeerOutcome::failed(conn.ip, "not connected");
            }
            match upload_one(conn.stream.as_mut().unwrap(), arg, song) {
                Ok(()) => PeerOutcome::ok(conn.ip),
                Err(e) => {
                    log::warn!("upload_all: upload to {} failed: {}", conn.ip, e);
                    conn.stream = None;
                    PeerOutcome::failed(conn.ip, e)
                }
            }
        })
        .collect()
}

fn upload_one(stream: &mut TcpStream, arg: u32, song: &[u8]) -> std::io::Result<()> {
    stream.write_all(&encode_header(Command::Upload, arg))?;
    stream.write_all(song)
}

/// Queries the reference clock (cmd=2) from the first live peer only.
pub fn query_reference_time(conns: &mut [PeerConnection]) -> Result<i64, ControlError> {
    let conn = conns
        .iter_mut()
        .find(|c| c.is_live())
        .ok_or(ControlError::NoLivePeer)?;
    let stream = conn.stream.as_mut().unwrap();

    stream.write_all(&encode_header(Command::QueryTime, 0))?;
    let mut ts_buf = [0u8; 8];
    stream.read_exact(&mut ts_buf)?;
    Ok(decode_timestamp(&ts_buf))
}

/// Computes the synchronized start instant from a reference-clock reading
/// by adding the fixed headroom: `T0 + 5s`.
pub fn plan_start(t0: i64) -> i64 {
    t0 + START_HEADROOM_US
}

/// Fans out the start-at command (cmd=3) to every connected peer and closes
/// each connection afterward.
pub fn start_at_all(conns: &mut [PeerConnection], t_start: i64) -> Vec<PeerOutcome> {
    conns
        .iter_mut()
        .map(|conn| {
            if !conn.is_live() {
                return PeerOutcome::failed(conn.ip, "not connected");
            }
            let stream = conn.stream.as_mut().unwrap();
            let result = stream
                .write_all(&encode_header(Command::StartAt, 0))
                .and_then(|_| stream.write_all(&encode_timestamp(t_start)));
            conn.stream = None; // no response is expected; close right after sending
            match result {
                Ok(()) => PeerOutcome::ok(conn.ip),
                Err(e) => {
                    log::warn!("start_at_all: start-at to {} failed: {}", conn.ip, e);
                    PeerOutcome::failed(conn.ip, e)
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn load_song_reads_file_contents() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xABu8; 1024]).unwrap();
        let song = load_song(file.path()).unwrap();
        assert_eq!(song, vec![0xABu8; 1024]);
    }

    #[test]
    fn connect_all_marks_unreachable_peer_dead() {
        // Nothing listens on CONTROL_PORT in the test environment, so this
        // connection attempt is expected to be refused.
        let peers = vec![Ipv4Addr::new(127, 0, 0, 1)];
        let conns = connect_all(&peers);
        assert_eq!(conns.len(), 1);
        assert!(!conns[0].is_live());
    }

    #[test]
    fn upload_and_start_at_against_stub_server() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut header = [0u8; 12];
            stream.read_exact(&mut header).unwrap();
            let arg = u32::from_le_bytes(header[8..12].try_into().unwrap());
            let mut payload = vec![0u8; arg as usize];
            stream.read_exact(&mut payload).unwrap();
            payload
        });

        let mut conns = vec![PeerConnection {
            ip: Ipv4Addr::new(127, 0, 0, 1),
            stream: Some(TcpStream::connect(addr).unwrap()),
        }];

        let song = vec![0xABu8; 1024];
        let outcomes = upload_all(&mut conns, &song);
        assert!(outcomes[0].is_ok());

        let received = server.join().unwrap();
        assert_eq!(received, song);
    }

    #[test]
    fn plan_start_adds_headroom() {
        assert_eq!(plan_start(1_000_000), 1_000_000 + START_HEADROOM_US);
    }
}
