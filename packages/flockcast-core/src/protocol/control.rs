//! Fixed-layout TCP control channel.
//!
//! Every command begins with a 12-byte header: `magic:u32, cmd:u32, arg:u32`.
//! Unlike the UDP announcement frame, a bad magic on the control channel is
//! **not** fatal — the protocol is permissive and keeps reading the next 8
//! bytes as `cmd`/`arg` regardless. [`read_field`]
//! exposes the three possible read outcomes so the control server and
//! controller can both implement that policy without duplicating the
//! short-read retry loop.

use std::io::Read;

use crate::constants::CONTROL_MAGIC;
use crate::error::CodecError;

/// Command codes carried in a control header's `cmd` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Upload a song payload (`arg` = payload length in bytes).
    Upload,
    /// Query the reference clock (no body; response is an 8-byte i64).
    QueryTime,
    /// Schedule playback at a reference-time deadline (8-byte i64 body).
    StartAt,
    /// Anything else. The `arg` field for `cmd=3` is otherwise unused by
    /// this protocol (the source always writes 0); a non-zero value here is
    /// reserved, not an error.
    Unknown(u32),
}

impl From<u32> for Command {
    fn from(cmd: u32) -> Self {
        match cmd {
            1 => Command::Upload,
            2 => Command::QueryTime,
            3 => Command::StartAt,
            other => Command::Unknown(other),
        }
    }
}

impl From<Command> for u32 {
    fn from(cmd: Command) -> u32 {
        match cmd {
            Command::Upload => 1,
            Command::QueryTime => 2,
            Command::StartAt => 3,
            Command::Unknown(v) => v,
        }
    }
}

/// A decoded 12-byte control header.
///
/// `magic_valid` records whether the magic matched; callers that need the
/// permissive bad-magic behavior check this flag and log instead of aborting.
#[derive(Debug, Clone, Copy)]
pub struct ControlHeader {
    pub magic_valid: bool,
    pub cmd: Command,
    pub arg: u32,
}

/// Encodes a 12-byte control header.
pub fn encode_header(cmd: Command, arg: u32) -> [u8; 12] {
    let mut buf = [0u8; 12];
    buf[0..4].copy_from_slice(&CONTROL_MAGIC.to_le_bytes());
    buf[4..8].copy_from_slice(&u32::from(cmd).to_le_bytes());
    buf[8..12].copy_from_slice(&arg.to_le_bytes());
    buf
}

/// Encodes an 8-byte little-endian reference timestamp, used for the
/// `cmd=2` response body and the `cmd=3` request body.
pub fn encode_timestamp(ts: i64) -> [u8; 8] {
    ts.to_le_bytes()
}

/// Decodes an 8-byte little-endian reference timestamp.
pub fn decode_timestamp(buf: &[u8; 8]) -> i64 {
    i64::from_le_bytes(*buf)
}

/// Outcome of attempting to read one fixed-size field from a TCP stream.
#[derive(Debug, PartialEq, Eq)]
pub enum FieldRead {
    /// The field was read in full.
    Complete,
    /// Zero bytes were available before the peer closed the connection — a
    /// clean close at a frame boundary, not an error.
    CleanEof,
}

/// Reads exactly `buf.len()` bytes from `reader`, retrying on short reads.
///
/// Returns [`FieldRead::CleanEof`] only if the very first read returns zero
/// bytes (no partial data was read). A read that returns some bytes and
/// then hits EOF before the buffer is full is reported as
/// [`CodecError::Eof`], matching the "EOF partway through a frame aborts
/// the connection" rule.
pub fn read_field<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<FieldRead, CodecError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return if filled == 0 {
                Ok(FieldRead::CleanEof)
            } else {
                Err(CodecError::Eof)
            };
        }
        filled += n;
    }
    Ok(FieldRead::Complete)
}

/// Reads a 12-byte control header from `reader`.
///
/// Returns `Ok(None)` on a clean EOF before any header bytes arrive (the
/// connection should be closed normally). A partial header read is an
/// error
pub fn read_header<R: Read>(reader: &mut R) -> Result<Option<ControlHeader>, CodecError> {
    let mut magic_buf = [0u8; 4];
    if read_field(reader, &mut magic_buf)? == FieldRead::CleanEof {
        return Ok(None);
    }
    let magic = u32::from_le_bytes(magic_buf);
    let magic_valid = magic == CONTROL_MAGIC;

    let mut cmd_buf = [0u8; 4];
    // A clean EOF here also closes the connection.
    if read_field(reader, &mut cmd_buf)? == FieldRead::CleanEof {
        return Ok(None);
    }
    let cmd = Command::from(u32::from_le_bytes(cmd_buf));

    let mut arg_buf = [0u8; 4];
    read_field(reader, &mut arg_buf)?;
    let arg = u32::from_le_bytes(arg_buf);

    Ok(Some(ControlHeader {
        magic_valid,
        cmd,
        arg,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_round_trips_through_reader() {
        let bytes = encode_header(Command::Upload, 1024);
        let mut cursor = Cursor::new(bytes.to_vec());
        let header = read_header(&mut cursor).unwrap().unwrap();
        assert!(header.magic_valid);
        assert_eq!(header.cmd, Command::Upload);
        assert_eq!(header.arg, 1024);
    }

    #[test]
    fn header_with_bad_magic_still_yields_cmd_and_arg() {
        let mut bytes = encode_header(Command::QueryTime, 0);
        bytes[0] = 0x00; // corrupt magic byte
        let mut cursor = Cursor::new(bytes.to_vec());
        let header = read_header(&mut cursor).unwrap().unwrap();
        assert!(!header.magic_valid);
        assert_eq!(header.cmd, Command::QueryTime);
    }

    #[test]
    fn clean_eof_before_header_returns_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_header(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn partial_header_is_an_error() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]); // only 3 of 4 magic bytes
        let err = read_header(&mut cursor).unwrap_err();
        assert!(matches!(err, CodecError::Eof));
    }

    #[test]
    fn timestamp_round_trips() {
        let ts = -123_456_789i64;
        let decoded = decode_timestamp(&encode_timestamp(ts));
        assert_eq!(decoded, ts);
    }
}
