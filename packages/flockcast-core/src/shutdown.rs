//! Cooperative shutdown signal shared across the announcer, listener, and
//! control-server threads.
//!
//! Every blocking socket in this crate is given a short read timeout (see
//! [`crate::net`]) so each loop notices a shutdown request within a bounded
//! time instead of blocking indefinitely on the next socket event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable, thread-safe shutdown flag.
#[derive(Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    /// Creates a new, not-yet-signaled shutdown flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals shutdown to every holder of a clone of this flag.
    pub fn signal(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown has been signaled.
    pub fn is_signaled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_is_visible_across_clones() {
        let a = Shutdown::new();
        let b = a.clone();
        assert!(!b.is_signaled());
        a.signal();
        assert!(b.is_signaled());
    }
}
