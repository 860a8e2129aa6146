//! Per-connection TCP control server implementing the upload / query-time /
//! start-at command protocol.

use std::io::Write;
use std::net::{SocketAddrV4, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::MAX_SONG_BYTES;
use crate::error::ControlError;
use crate::net;
use crate::protocol::{encode_timestamp, read_field, read_header, Command, FieldRead};
use crate::reference_clock::ReferenceClock;
use crate::sink::AudioSink;
use crate::shutdown::Shutdown;

/// Socket accept timeout, bounding how quickly the server notices shutdown.
const ACCEPT_TIMEOUT: Duration = Duration::from_millis(250);

/// A connection's position in the upload/start-at sequence.
///
/// A connection starts `Idle`. `cmd=1` moves it to `Loaded` once the full
/// song body has been read. `cmd=3` moves a `Loaded` connection to
/// `Playing` and is rejected outright on an `Idle` one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Idle,
    Loaded,
    Playing,
}

/// Accepts control connections on [`crate::constants::CONTROL_PORT`] and
/// runs each one to completion, one at a time.
pub struct ControlServer {
    listener: TcpListener,
    reference_clock: ReferenceClock,
    sink: Arc<dyn AudioSink>,
    shutdown: Shutdown,
}

impl ControlServer {
    /// Binds the control listener on `bind_addr`.
    pub fn bind(
        bind_addr: SocketAddrV4,
        reference_clock: ReferenceClock,
        sink: Arc<dyn AudioSink>,
        shutdown: Shutdown,
    ) -> std::io::Result<Self> {
        let listener = net::new_tcp_listener(bind_addr, 16)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            reference_clock,
            sink,
            shutdown,
        })
    }

    /// Runs the accept loop until shutdown is signaled.
    ///
    /// Connections are served sequentially, one at a time: a speaker never
    /// needs more than one controller talking to it at once, and serializing
    /// connections avoids interleaving state across concurrent uploads into
    /// the same process.
    pub fn run(&self) {
        log::info!(
            "control_server: listening on {}",
            self.listener.local_addr().unwrap()
        );
        while !self.shutdown.is_signaled() {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    if let Err(e) = stream.set_nonblocking(false) {
                        log::warn!("control_server: failed to set blocking mode: {}", e);
                        continue;
                    }
                    if let Err(e) = self.handle_connection(stream) {
                        log::warn!("control_server: connection error: {}", e);
                    }
                }
                Err(e) if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
                {
                    std::thread::sleep(ACCEPT_TIMEOUT);
                }
                Err(e) => log::warn!("control_server: accept error: {}", e),
            }
        }
        log::info!("control_server: shut down");
    }

    fn handle_connection(&self, mut stream: TcpStream) -> Result<(), ControlError> {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        log::debug!("control_server: connection from {}", peer);

        let mut state = ConnState::Idle;
        let mut song = Vec::new();

        loop {
            let header = match read_header(&mut stream)? {
                Some(h) => h,
                None => {
                    log::debug!("control_server: {} closed the connection", peer);
                    return Ok(());
                }
            };

            if !header.magic_valid {
                // Permissive: log and keep reading the next command as if
                // the magic had matched, rather than resyncing or closing.
                log::warn!("control_server: {} sent a bad control magic", peer);
            }

            match header.cmd {
                Command::Upload => {
                    song = self.handle_upload(&mut stream, header.arg)?;
                    state = ConnState::Loaded;
                }
                Command::QueryTime => {
                    let ts = self.reference_clock.get_time();
                    stream.write_all(&encode_timestamp(ts))?;
                }
                Command::StartAt => {
                    self.handle_start_at(&mut stream, state, &song)?;
                    state = ConnState::Playing;
                    return Ok(());
                }
                Command::Unknown(code) => {
                    log::warn!("control_server: {} sent unknown command {}", peer, code);
                }
            }
        }
    }

    fn handle_upload(
        &self,
        stream: &mut TcpStream,
        arg: u32,
    ) -> Result<Vec<u8>, ControlError> {
        let requested = arg as usize;
        if requested > MAX_SONG_BYTES {
            return Err(ControlError::SongTooLarge {
                requested,
                limit: MAX_SONG_BYTES,
            });
        }

        let mut buf = vec![0u8; requested];
        match read_field(stream, &mut buf)? {
            FieldRead::Complete => Ok(buf),
            FieldRead::CleanEof => Err(ControlError::Codec(crate::error::CodecError::Eof)),
        }
    }

    fn handle_start_at(
        &self,
        stream: &mut TcpStream,
        state: ConnState,
        song: &[u8],
    ) -> Result<(), ControlError> {
        let mut ts_buf = [0u8; 8];
        if read_field(stream, &mut ts_buf)? == FieldRead::CleanEof {
            return Err(ControlError::Codec(crate::error::CodecError::Eof));
        }
        let start_at = crate::protocol::decode_timestamp(&ts_buf);

        if state == ConnState::Idle {
            log::warn!("control_server: start-at received with no song loaded");
            return Err(ControlError::NoSongLoaded);
        }

        self.reference_clock.sleep_until(start_at);
        self.sink
            .decode_and_play(song)
            .map_err(|e| ControlError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterView;
    use crate::protocol::{encode_header, encode_timestamp};
    use crate::sink::NullSink;
    use std::io::Read;
    use std::net::{Ipv4Addr, TcpStream as StdTcpStream};
    use std::thread;

    fn start_server() -> (SocketAddrV4, Shutdown, thread::JoinHandle<()>) {
        let view = ClusterView::new();
        let clock = ReferenceClock::new(view, Ipv4Addr::new(127, 0, 0, 1));
        let shutdown = Shutdown::new();
        let server = ControlServer::bind(
            SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 0),
            clock,
            Arc::new(NullSink),
            shutdown.clone(),
        )
        .unwrap();
        let addr = SocketAddrV4::new(
            Ipv4Addr::new(127, 0, 0, 1),
            server.listener.local_addr().unwrap().port(),
        );
        let handle = thread::spawn(move || server.run());
        (addr, shutdown, handle)
    }

    #[test]
    fn query_time_returns_a_timestamp() {
        let (addr, shutdown, handle) = start_server();
        let mut stream = StdTcpStream::connect(addr).unwrap();
        stream
            .write_all(&encode_header(Command::QueryTime, 0))
            .unwrap();
        let mut buf = [0u8; 8];
        stream.read_exact(&mut buf).unwrap();
        let ts = crate::protocol::decode_timestamp(&buf);
        assert!(ts > 0);

        drop(stream);
        shutdown.signal();
        handle.join().unwrap();
    }

    #[test]
    fn upload_then_start_at_plays_through_sink() {
        let (addr, shutdown, handle) = start_server();
        let mut stream = StdTcpStream::connect(addr).unwrap();

        let song = vec![0x11u8; 256];
        stream
            .write_all(&encode_header(Command::Upload, song.len() as u32))
            .unwrap();
        stream.write_all(&song).unwrap();

        stream
            .write_all(&encode_header(Command::StartAt, 0))
            .unwrap();
        stream
            .write_all(&encode_timestamp(crate::time::now_us() - 1_000_000))
            .unwrap();

        // The server closes the connection after start-at completes.
        let mut trailing = [0u8; 1];
        let n = stream.read(&mut trailing).unwrap_or(0);
        assert_eq!(n, 0);

        shutdown.signal();
        handle.join().unwrap();
    }

    #[test]
    fn oversized_upload_is_rejected() {
        let (addr, shutdown, handle) = start_server();
        let mut stream = StdTcpStream::connect(addr).unwrap();

        stream
            .write_all(&encode_header(
                Command::Upload,
                (MAX_SONG_BYTES + 1) as u32,
            ))
            .unwrap();

        // The server rejects before reading the body and closes; a short
        // read or an error on the next write both demonstrate the
        // connection did not proceed as if the (absurd) upload succeeded.
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf);

        shutdown.signal();
        handle.join().unwrap();
    }

    #[test]
    fn start_at_without_upload_is_rejected() {
        let (addr, shutdown, handle) = start_server();
        let mut stream = StdTcpStream::connect(addr).unwrap();

        stream
            .write_all(&encode_header(Command::StartAt, 0))
            .unwrap();
        stream
            .write_all(&encode_timestamp(crate::time::now_us()))
            .unwrap();

        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf);

        shutdown.signal();
        handle.join().unwrap();
    }

    #[test]
    fn bad_magic_is_tolerated_and_next_command_still_works() {
        let (addr, shutdown, handle) = start_server();
        let mut stream = StdTcpStream::connect(addr).unwrap();

        let mut bad_header = encode_header(Command::QueryTime, 0);
        bad_header[0] = 0x00;
        stream.write_all(&bad_header).unwrap();

        let mut buf = [0u8; 8];
        stream.read_exact(&mut buf).unwrap();
        assert!(crate::protocol::decode_timestamp(&buf) > 0);

        drop(stream);
        shutdown.signal();
        handle.join().unwrap();
    }
}
