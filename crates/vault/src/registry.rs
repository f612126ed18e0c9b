//! Hot-swappable handle to the live backend connection.

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Owner of the live connection handle.
///
/// Consumers call [`ConnectionRegistry::current`] for every new request and
/// hold the returned `Arc` for that request only. [`ConnectionRegistry::replace`]
/// swaps the handle in one step: requests already holding the old `Arc` finish
/// against the old target, and no caller can observe a partially built handle.
pub struct ConnectionRegistry<H> {
    handle: RwLock<Arc<H>>,
    generation: AtomicU64,
}

impl<H> ConnectionRegistry<H> {
    pub fn new(initial: H) -> Self {
        Self {
            handle: RwLock::new(Arc::new(initial)),
            generation: AtomicU64::new(0),
        }
    }

    /// Handle to use for a new request.
    pub fn current(&self) -> Arc<H> {
        self.handle.read().clone()
    }

    /// Installs `next` and returns the handle it replaced.
    pub fn replace(&self, next: H) -> Arc<H> {
        let next = Arc::new(next);
        let previous = std::mem::replace(&mut *self.handle.write(), next);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(generation, "Connection handle replaced");
        previous
    }

    /// Number of completed replacements since construction.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl<H: std::fmt::Debug> std::fmt::Debug for ConnectionRegistry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("handle", &*self.handle.read())
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Handle(&'static str);

    #[test]
    fn replace_swaps_current_handle() {
        let registry = ConnectionRegistry::new(Handle("old"));
        assert_eq!(registry.current().0, "old");
        assert_eq!(registry.generation(), 0);

        let previous = registry.replace(Handle("new"));
        assert_eq!(previous.0, "old");
        assert_eq!(registry.current().0, "new");
        assert_eq!(registry.generation(), 1);
    }

    #[test]
    fn in_flight_holder_keeps_old_handle() {
        let registry = ConnectionRegistry::new(Handle("old"));
        let in_flight = registry.current();
        registry.replace(Handle("new"));
        assert_eq!(in_flight.0, "old");
        assert_eq!(registry.current().0, "new");
    }

    #[test]
    fn concurrent_readers_only_see_whole_handles() {
        let registry = Arc::new(ConnectionRegistry::new(Handle("a")));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        let seen = registry.current();
                        assert!(seen.0 == "a" || seen.0 == "b");
                    }
                })
            })
            .collect();
        for _ in 0..100 {
            registry.replace(Handle("b"));
            registry.replace(Handle("a"));
        }
        for reader in readers {
            reader.join().expect("reader thread");
        }
        assert_eq!(registry.generation(), 200);
    }
}
