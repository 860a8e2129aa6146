//! Wire codecs for the two protocols this crate speaks: the UDP
//! announcement broadcast and the TCP control channel.

mod announcement;
mod control;

pub use announcement::{AnnouncementFrame, MachineEntry, ANNOUNCEMENT_FRAME_LEN};
pub use control::{
    decode_timestamp, encode_header, encode_timestamp, read_field, read_header, Command,
    ControlHeader, FieldRead,
};
