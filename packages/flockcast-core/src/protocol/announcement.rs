//! Fixed-layout UDP announcement frame.
//!
//! ```text
//! offset size field
//! 0      8    magic  = 0x1435089464683975
//! 8      8    ts     (int64, local microseconds)
//! 16     32 × (4+8=12) machines[32]:
//!                +0 ip  (uint32, network byte order — same bytes as sockaddr_in)
//!                +4 td  (int64, microseconds)
//! Total: 16 + 32*12 = 400 bytes.
//! ```
//!
//! Host byte order for multi-byte integers only works on a
//! homogeneous-endianness LAN, so `ts` and `td` are fixed to little-endian on
//! the wire. The `ip` field is encoded in its natural octet order, the same
//! bytes a `sockaddr_in` carries, so it round-trips regardless of host
//! endianness.

use std::net::Ipv4Addr;

use crate::constants::{ANNOUNCEMENT_MAGIC, MAX_MACHINES};
use crate::error::CodecError;

/// One peer's reported clock delta, as carried in an announcement frame.
///
/// Unused slots have both fields zero, which [`Ipv4Addr::UNSPECIFIED`]
/// models naturally (`0.0.0.0` is never a valid peer address).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineEntry {
    pub ip: Ipv4Addr,
    pub td: i64,
}

impl MachineEntry {
    const EMPTY: MachineEntry = MachineEntry {
        ip: Ipv4Addr::UNSPECIFIED,
        td: 0,
    };

    fn is_empty(&self) -> bool {
        self.ip == Ipv4Addr::UNSPECIFIED && self.td == 0
    }
}

/// Byte length of an encoded [`AnnouncementFrame`].
pub const ANNOUNCEMENT_FRAME_LEN: usize = 8 + 8 + MAX_MACHINES * 12;

/// A 400-byte UDP broadcast announcing one node's local time and its view
/// of peer clock deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementFrame {
    /// Sender's local time at frame construction, in microseconds.
    ///
    /// Per the protocol's resolved open question, this reflects the moment of
    /// construction rather than the moment of `sendto`, so offset estimates
    /// stay unbiased by send-path latency.
    pub ts: i64,
    /// Up to [`MAX_MACHINES`] `(peer_ip, td)` entries; unused slots are zero.
    pub machines: Vec<MachineEntry>,
}

impl AnnouncementFrame {
    /// Builds a frame from a timestamp and a list of peer tds, truncating to
    /// [`MAX_MACHINES`] entries and zero-filling the rest.
    pub fn new(ts: i64, peers: impl IntoIterator<Item = (Ipv4Addr, i64)>) -> Self {
        let machines: Vec<MachineEntry> = peers
            .into_iter()
            .take(MAX_MACHINES)
            .map(|(ip, td)| MachineEntry { ip, td })
            .collect();
        Self { ts, machines }
    }

    /// Encodes this frame into its fixed 400-byte wire representation.
    pub fn encode(&self) -> [u8; ANNOUNCEMENT_FRAME_LEN] {
        let mut buf = [0u8; ANNOUNCEMENT_FRAME_LEN];
        buf[0..8].copy_from_slice(&ANNOUNCEMENT_MAGIC.to_le_bytes());
        buf[8..16].copy_from_slice(&self.ts.to_le_bytes());

        for i in 0..MAX_MACHINES {
            let entry = self.machines.get(i).copied().unwrap_or(MachineEntry::EMPTY);
            let off = 16 + i * 12;
            buf[off..off + 4].copy_from_slice(&entry.ip.octets());
            buf[off + 4..off + 12].copy_from_slice(&entry.td.to_le_bytes());
        }

        buf
    }

    /// Decodes a frame from exactly [`ANNOUNCEMENT_FRAME_LEN`] bytes.
    ///
    /// Returns [`CodecError::WrongLength`] if `buf` is not exactly the
    /// expected size (a short UDP datagram) and [`CodecError::BadMagic`] if
    /// the magic constant doesn't match.
    /// Empty (all-zero) machine slots are dropped from the returned list.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != ANNOUNCEMENT_FRAME_LEN {
            return Err(CodecError::WrongLength {
                expected: ANNOUNCEMENT_FRAME_LEN,
                got: buf.len(),
            });
        }

        let magic = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        if magic != ANNOUNCEMENT_MAGIC {
            return Err(CodecError::BadMagic {
                expected: ANNOUNCEMENT_MAGIC,
                got: magic,
            });
        }

        let ts = i64::from_le_bytes(buf[8..16].try_into().unwrap());

        let mut machines = Vec::with_capacity(MAX_MACHINES);
        for i in 0..MAX_MACHINES {
            let off = 16 + i * 12;
            let ip = Ipv4Addr::new(buf[off], buf[off + 1], buf[off + 2], buf[off + 3]);
            let td = i64::from_le_bytes(buf[off + 4..off + 12].try_into().unwrap());
            let entry = MachineEntry { ip, td };
            if !entry.is_empty() {
                machines.push(entry);
            }
        }

        Ok(Self { ts, machines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_fields() {
        let frame = AnnouncementFrame::new(
            1_234_567_890,
            vec![
                (Ipv4Addr::new(192, 168, 1, 10), 42),
                (Ipv4Addr::new(192, 168, 1, 11), -17),
            ],
        );
        let encoded = frame.encode();
        assert_eq!(encoded.len(), ANNOUNCEMENT_FRAME_LEN);
        let decoded = AnnouncementFrame::decode(&encoded).unwrap();
        assert_eq!(decoded.ts, frame.ts);
        assert_eq!(decoded.machines, frame.machines);
    }

    #[test]
    fn round_trip_empty_machines() {
        let frame = AnnouncementFrame::new(0, vec![]);
        let encoded = frame.encode();
        let decoded = AnnouncementFrame::decode(&encoded).unwrap();
        assert!(decoded.machines.is_empty());
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut buf = AnnouncementFrame::new(1, vec![]).encode();
        buf[0] ^= 0xFF;
        let err = AnnouncementFrame::decode(&buf).unwrap_err();
        assert!(matches!(err, CodecError::BadMagic { .. }));
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = AnnouncementFrame::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, CodecError::WrongLength { got: 10, .. }));
    }

    #[test]
    fn encode_truncates_to_max_machines() {
        let peers: Vec<_> = (0..40)
            .map(|i| (Ipv4Addr::new(10, 0, 0, i as u8), i as i64))
            .collect();
        let frame = AnnouncementFrame::new(0, peers);
        let encoded = frame.encode();
        let decoded = AnnouncementFrame::decode(&encoded).unwrap();
        assert_eq!(decoded.machines.len(), MAX_MACHINES);
    }

    #[test]
    fn ip_octets_preserved_across_wire() {
        let frame = AnnouncementFrame::new(0, vec![(Ipv4Addr::new(203, 0, 113, 42), 7)]);
        let encoded = frame.encode();
        // ip octets land at offset 16 in natural address order.
        assert_eq!(&encoded[16..20], &[203, 0, 113, 42]);
    }
}
