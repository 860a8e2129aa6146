//! Shared cluster membership state.
//!
//! A single [`parking_lot::Mutex`] serializes all access, with a
//! get-or-insert primitive that preserves the "insert a default-constructed
//! peer on first sample" semantic without ever touching a slot that doesn't
//! exist yet.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::estimator::PeerEstimator;

/// Cluster-wide view of known peers, keyed by their IPv4 address.
///
/// Created empty at daemon start. Entries are inserted on first sample from
/// a new peer and persist for the lifetime of the process; a peer becomes
/// non-live after [`crate::constants::LIVENESS_WINDOW_US`] of silence but is
/// never explicitly removed during normal operation.
#[derive(Clone, Default)]
pub struct ClusterView {
    inner: Arc<Mutex<HashMap<Ipv4Addr, PeerEstimator>>>,
}

impl ClusterView {
    /// Creates an empty cluster view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one clock-delta sample for `peer`, inserting a
    /// default-constructed [`PeerEstimator`] on first contact.
    pub fn record_sample(&self, peer: Ipv4Addr, local_rx_us: i64, remote_tx_us: i64) {
        let mut guard = self.inner.lock();
        guard
            .entry(peer)
            .or_insert_with(PeerEstimator::new)
            .add_sample(local_rx_us, remote_tx_us);
    }

    /// Records what `peer` has most recently reported as its delta estimate
    /// for this node.
    pub fn record_peer_reported_delta(&self, peer: Ipv4Addr, delta: i64) {
        let mut guard = self.inner.lock();
        if let Some(estimator) = guard.get_mut(&peer) {
            estimator.set_peer_reported_delta_for_me(delta);
        }
    }

    /// Returns a `(ip, td)` snapshot of every known peer, for serializing
    /// into an announcement frame. The lock is held for the duration of the
    /// copy.
    pub fn snapshot_tds(&self) -> Vec<(Ipv4Addr, i64)> {
        let guard = self.inner.lock();
        guard.iter().map(|(ip, e)| (*ip, e.td())).collect()
    }

    /// Returns the smallest IPv4 address among peers considered live at
    /// `now_us`, or `None` if no peer is live.
    pub fn min_live_peer_ip(&self, now_us: i64) -> Option<Ipv4Addr> {
        let guard = self.inner.lock();
        guard
            .iter()
            .filter(|(_, e)| e.is_live(now_us))
            .map(|(ip, _)| *ip)
            .min()
    }

    /// Returns the current `td()` estimate for `peer`, or `i64::MAX` if the
    /// peer is unknown.
    pub fn td_for(&self, peer: Ipv4Addr) -> i64 {
        let guard = self.inner.lock();
        guard.get(&peer).map(|e| e.td()).unwrap_or(i64::MAX)
    }

    /// Number of peers known to this node (live or not).
    pub fn peer_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// For tests: seeds a peer directly with a given delta and liveness
    /// timestamp, bypassing the normal sample-accumulation path.
    #[cfg(test)]
    pub fn seed(&self, peer: Ipv4Addr, td: i64, last_seen_us: i64) {
        let mut guard = self.inner.lock();
        let estimator = guard.entry(peer).or_insert_with(PeerEstimator::new);
        // A single sample whose value equals `td` reproduces `td()` exactly.
        estimator.add_sample(last_seen_us + td, last_seen_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
        Ipv4Addr::new(a, b, c, d)
    }

    #[test]
    fn record_sample_creates_peer_on_first_contact() {
        let view = ClusterView::new();
        assert_eq!(view.peer_count(), 0);
        view.record_sample(ip(10, 0, 0, 1), 1_000, 900);
        assert_eq!(view.peer_count(), 1);
        assert_eq!(view.td_for(ip(10, 0, 0, 1)), 100);
    }

    #[test]
    fn min_live_peer_ip_ignores_stale_peers() {
        let view = ClusterView::new();
        view.seed(ip(10, 0, 0, 5), 0, 0);
        view.seed(ip(10, 0, 0, 1), 0, 10_000_000); // fresher, lower IP
        assert_eq!(view.min_live_peer_ip(10_000_000), Some(ip(10, 0, 0, 1)));
    }

    #[test]
    fn min_live_peer_ip_none_when_empty() {
        let view = ClusterView::new();
        assert_eq!(view.min_live_peer_ip(0), None);
    }

    #[test]
    fn td_for_unknown_peer_is_max() {
        let view = ClusterView::new();
        assert_eq!(view.td_for(ip(1, 2, 3, 4)), i64::MAX);
    }
}
