//! Fixed protocol constants that should NOT be changed.
//!
//! These values are part of the wire format and the coordination protocol;
//! changing them breaks compatibility with any peer still running the old
//! value.

/// UDP port the time-sync announcer/listener use for broadcast gossip.
pub const TIMESYNC_PORT: u16 = 8086;

/// TCP port the control server listens on.
pub const CONTROL_PORT: u16 = 8085;

/// Magic value identifying a valid [`crate::protocol::AnnouncementFrame`].
pub const ANNOUNCEMENT_MAGIC: u64 = 0x1435_0894_6468_3975;

/// Magic value identifying a valid [`crate::protocol::ControlHeader`].
pub const CONTROL_MAGIC: u32 = 0xAA55_AA55;

/// Maximum number of peers carried in a single announcement frame.
pub const MAX_MACHINES: usize = 32;

/// Maximum number of clock-delta samples retained per peer.
///
/// Oldest samples are evicted once this bound is exceeded; see
/// [`crate::estimator::PeerEstimator::add_sample`].
pub const MAX_SAMPLES: usize = 120;

/// A peer is considered live if an announcement from it arrived within this
/// many microseconds of "now".
pub const LIVENESS_WINDOW_US: i64 = 5_000_000;

/// Interval between announcer broadcasts, in seconds.
pub const ANNOUNCE_INTERVAL_SECS: u64 = 1;

/// Headroom added to the reference clock reading to compute the
/// synchronized start instant (see [`crate::controller::plan_start`]).
pub const START_HEADROOM_US: i64 = 5_000_000;

/// Maximum song payload accepted by the control server (cmd=1), enforced
/// explicitly before allocating a buffer for the upload.
pub const MAX_SONG_BYTES: usize = 10 * 1024 * 1024;
