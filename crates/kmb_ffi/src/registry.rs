//! Accounting for engine-owned result buffers.
//!
//! Every successful `read_events` / `query` / `query_at` call hands the
//! client a buffer that must be released exactly once. Guards report both
//! ends of that lifecycle here so leaks show up as a non-zero
//! [`RegistrySnapshot::outstanding`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Kind of engine-owned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// A `KmbReadResult`.
    ReadResult,
    /// A `KmbQueryResult`.
    QueryResult,
}

/// Per-engine acquire/release counters.
#[derive(Debug, Default)]
pub struct BufferRegistry {
    read_acquired: AtomicU64,
    read_released: AtomicU64,
    query_acquired: AtomicU64,
    query_released: AtomicU64,
}

impl BufferRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_acquire(&self, kind: BufferKind) {
        self.counter(kind, true).fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self, kind: BufferKind) {
        self.counter(kind, false).fetch_add(1, Ordering::Relaxed);
    }

    fn counter(&self, kind: BufferKind, acquire: bool) -> &AtomicU64 {
        match (kind, acquire) {
            (BufferKind::ReadResult, true) => &self.read_acquired,
            (BufferKind::ReadResult, false) => &self.read_released,
            (BufferKind::QueryResult, true) => &self.query_acquired,
            (BufferKind::QueryResult, false) => &self.query_released,
        }
    }

    /// Returns a copy of the counters.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            read_acquired: self.read_acquired.load(Ordering::Relaxed),
            read_released: self.read_released.load(Ordering::Relaxed),
            query_acquired: self.query_acquired.load(Ordering::Relaxed),
            query_released: self.query_released.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`BufferRegistry`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    /// Read results handed out by the engine.
    pub read_acquired: u64,
    /// Read results released back to the engine.
    pub read_released: u64,
    /// Query results handed out by the engine.
    pub query_acquired: u64,
    /// Query results released back to the engine.
    pub query_released: u64,
}

impl RegistrySnapshot {
    /// Buffers acquired but not yet released.
    pub fn outstanding(&self) -> u64 {
        self.read_acquired.saturating_sub(self.read_released)
            + self.query_acquired.saturating_sub(self.query_released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_balance() {
        let registry = BufferRegistry::new();
        registry.record_acquire(BufferKind::ReadResult);
        registry.record_acquire(BufferKind::QueryResult);
        registry.record_acquire(BufferKind::QueryResult);
        assert_eq!(registry.snapshot().outstanding(), 3);

        registry.record_release(BufferKind::QueryResult);
        registry.record_release(BufferKind::ReadResult);
        let snap = registry.snapshot();
        assert_eq!(snap.read_acquired, 1);
        assert_eq!(snap.read_released, 1);
        assert_eq!(snap.query_acquired, 2);
        assert_eq!(snap.outstanding(), 1);
    }
}
