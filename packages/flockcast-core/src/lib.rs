//! Flockcast core: cluster-wide time synchronization and the
//! distribute/query/schedule protocol used to start playback on every
//! speaker node at the same wall-clock instant.
//!
//! This crate is the shared library consumed by the `speakerd` (speaker
//! node) and `sendctl` (controller) binaries. It has no audio decoding or
//! sound-card I/O of its own beyond the [`sink::AudioSink`] trait contract;
//! that boundary is deliberate — decoding and playback are opaque external
//! collaborators this crate only interfaces with.

pub mod cluster;
pub mod constants;
pub mod control_server;
pub mod controller;
pub mod error;
pub mod estimator;
pub mod listener;
pub mod net;
pub mod protocol;
pub mod reference_clock;
pub mod shutdown;
pub mod sink;
pub mod time;

mod announcer;

pub use announcer::Announcer;
pub use cluster::ClusterView;
pub use control_server::ControlServer;
pub use error::{CodecError, ControlError, DiscoverError, SinkError, SyncError, SyncResult};
pub use estimator::{PeerEstimator, Sample};
pub use reference_clock::ReferenceClock;
pub use shutdown::Shutdown;
pub use sink::{AudioSink, NullSink, PcmFormat};
