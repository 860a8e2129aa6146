//! Centralized error types for the Flockcast core library.
//!
//! Each layer defines its own narrow error type, and a top-level
//! [`SyncError`] composes them with `#[from]` conversions so callers at the
//! binary boundary can use a single `Result` type.

use std::io;

use thiserror::Error;

/// Errors from the fixed-layout wire codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame's magic constant did not match. The caller should drop the
    /// frame and continue (UDP) or, for the permissive control protocol,
    /// keep reading the remaining header bytes (TCP).
    #[error("bad magic: expected {expected:#x}, got {got:#x}")]
    BadMagic { expected: u64, got: u64 },

    /// A UDP datagram arrived with a length other than the expected frame
    /// size. Per this frame is dropped, not an error condition.
    #[error("unexpected frame length: expected {expected}, got {got}")]
    WrongLength { expected: usize, got: usize },

    /// The peer closed the connection mid-frame (as opposed to a clean
    /// close between frames, which is not an error).
    #[error("connection closed mid-frame")]
    Eof,

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from the control-server and controller protocol layer.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Upload (`cmd=1`) requested more bytes than [`crate::constants::MAX_SONG_BYTES`].
    #[error("upload of {requested} bytes exceeds the {limit}-byte buffer bound")]
    SongTooLarge { requested: usize, limit: usize },

    /// `cmd=3` (start-at) arrived with no song loaded.
    #[error("start-at received with no song loaded")]
    NoSongLoaded,

    /// The controller has no connected peer to send a command to.
    #[error("no connected peer available")]
    NoLivePeer,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from speaker discovery on the controller side.
#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("failed to bind discovery socket: {0}")]
    SocketBind(#[source] io::Error),

    #[error("discovery timed out waiting for an announcement")]
    Timeout,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors from the audio sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open audio device: {0}")]
    OpenDevice(#[source] io::Error),

    #[error("audio sink unsupported on this platform/build")]
    Unsupported,

    #[error("I/O error writing to audio device: {0}")]
    Io(#[from] io::Error),
}

/// Top-level error type for Flockcast operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Discover(#[from] DiscoverError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias for fallible Flockcast operations.
pub type SyncResult<T> = Result<T, SyncError>;
