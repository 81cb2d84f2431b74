// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Rill stream log - Metrics-collecting wrapper store
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wraps any `StreamStore` and transparently collects operation counts,
// byte totals, and commit latency. Because the wrapper satisfies the same
// contract as what it wraps, it is also the worked example of extending a
// store by composition: hold the base implementation, delegate every
// operation, and override selectively.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::entry::{EntryType, StreamEntry};
use crate::error::StoreResult;
use crate::header::Header;
use crate::store::{StreamIterator, StreamStore};

/// Accumulated statistics for a stream store.
///
/// All counters are monotonically increasing for the lifetime of the
/// [`MetricsStore`] that owns them.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Number of entries staged via `add_stream_entry`.
    pub entries_staged: u64,
    /// Number of bookmarks staged via `add_stream_bookmark`.
    pub bookmarks_staged: u64,
    /// Number of successful commits.
    pub commits: u64,
    /// Number of successful rollbacks.
    pub rollbacks: u64,
    /// Number of `get_entry` calls that returned an entry.
    pub entries_read: u64,
    /// Number of `get_bookmark` calls.
    pub bookmark_lookups: u64,
    /// Number of iterators opened.
    pub iterators_opened: u64,
    /// Total payload bytes staged across all operations.
    pub bytes_staged: u64,
    /// Total payload bytes returned by `get_entry`.
    pub bytes_read: u64,
    /// Cumulative wall-clock latency of all commits, in milliseconds.
    pub commit_latency_sum_ms: f64,
}

/// A stream store wrapper that collects operation metrics.
///
/// Delegates every operation to an inner store while counting invocations
/// and measuring commit latency. Statistics are available via
/// [`MetricsStore::stats`].
pub struct MetricsStore<S: StreamStore> {
    /// The wrapped store that performs the actual storage operations.
    inner: S,
    /// Shared, mutable statistics accumulator.
    stats: Arc<Mutex<StoreStats>>,
}

impl<S: StreamStore> MetricsStore<S> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            stats: Arc::new(Mutex::new(StoreStats::default())),
        }
    }

    /// Return a snapshot of the current statistics.
    pub fn stats(&self) -> StoreStats {
        self.stats_lock().clone()
    }

    /// Reset all statistics to zero.
    pub fn reset_stats(&self) {
        *self.stats_lock() = StoreStats::default();
    }

    /// Return a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn stats_lock(&self) -> MutexGuard<'_, StoreStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S: StreamStore> StreamStore for MetricsStore<S> {
    fn start_atomic_op(&self) -> StoreResult<()> {
        self.inner.start_atomic_op()
    }

    fn add_stream_entry(&self, entry_type: EntryType, data: &[u8]) -> StoreResult<u64> {
        let result = self.inner.add_stream_entry(entry_type, data);
        if result.is_ok() {
            let mut s = self.stats_lock();
            s.entries_staged += 1;
            s.bytes_staged += data.len() as u64;
        }
        result
    }

    fn add_stream_bookmark(&self, label: &[u8]) -> StoreResult<u64> {
        let result = self.inner.add_stream_bookmark(label);
        if result.is_ok() {
            let mut s = self.stats_lock();
            s.bookmarks_staged += 1;
            s.bytes_staged += label.len() as u64;
        }
        result
    }

    fn commit_atomic_op(&self) -> StoreResult<()> {
        let start = Instant::now();
        let result = self.inner.commit_atomic_op();
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        if result.is_ok() {
            let mut s = self.stats_lock();
            s.commits += 1;
            s.commit_latency_sum_ms += elapsed_ms;
        }
        result
    }

    fn rollback_atomic_op(&self) -> StoreResult<()> {
        let result = self.inner.rollback_atomic_op();
        if result.is_ok() {
            self.stats_lock().rollbacks += 1;
        }
        result
    }

    fn get_entry(&self, number: u64) -> StoreResult<StreamEntry> {
        let result = self.inner.get_entry(number);
        if let Ok(ref entry) = result {
            let mut s = self.stats_lock();
            s.entries_read += 1;
            s.bytes_read += entry.data.len() as u64;
        }
        result
    }

    fn get_header(&self) -> Header {
        self.inner.get_header()
    }

    fn get_bookmark(&self, label: &[u8]) -> StoreResult<u64> {
        self.stats_lock().bookmark_lookups += 1;
        self.inner.get_bookmark(label)
    }

    fn get_iterator(
        &self,
        start: u64,
        forward: bool,
    ) -> StoreResult<Box<dyn StreamIterator + Send>> {
        let result = self.inner.get_iterator(start, forward);
        if result.is_ok() {
            self.stats_lock().iterators_opened += 1;
        }
        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::StreamType;
    use crate::header::StreamOptions;
    use crate::memory::InMemoryStore;

    fn metered() -> MetricsStore<InMemoryStore> {
        MetricsStore::new(InMemoryStore::new(StreamOptions::new(1, 1, StreamType(1))))
    }

    #[test]
    fn test_staging_counts_and_bytes() {
        let store = metered();

        store.start_atomic_op().unwrap();
        store.add_stream_entry(EntryType(1), b"hello").unwrap(); // 5 bytes
        store.add_stream_entry(EntryType(1), b"world!").unwrap(); // 6 bytes
        store.add_stream_bookmark(b"bm").unwrap(); // 2 bytes
        store.commit_atomic_op().unwrap();

        let stats = store.stats();
        assert_eq!(stats.entries_staged, 2);
        assert_eq!(stats.bookmarks_staged, 1);
        assert_eq!(stats.bytes_staged, 13);
        assert_eq!(stats.commits, 1);
        assert!(stats.commit_latency_sum_ms >= 0.0);
    }

    #[test]
    fn test_failed_calls_not_counted() {
        let store = metered();

        // No operation open: staging fails and counts nothing.
        assert!(store.add_stream_entry(EntryType(1), b"x").is_err());
        assert!(store.commit_atomic_op().is_err());

        let stats = store.stats();
        assert_eq!(stats.entries_staged, 0);
        assert_eq!(stats.commits, 0);
    }

    #[test]
    fn test_read_counts() {
        let store = metered();

        store.start_atomic_op().unwrap();
        store.add_stream_entry(EntryType(1), b"abc").unwrap();
        store.commit_atomic_op().unwrap();

        store.get_entry(0).unwrap();
        store.get_entry(0).unwrap();
        assert!(store.get_entry(99).is_err());

        let stats = store.stats();
        assert_eq!(stats.entries_read, 2);
        assert_eq!(stats.bytes_read, 6);
    }

    #[test]
    fn test_rollback_and_iterator_counts() {
        let store = metered();

        store.start_atomic_op().unwrap();
        store.add_stream_entry(EntryType(1), b"x").unwrap();
        store.rollback_atomic_op().unwrap();

        let mut iter = store.get_iterator(0, true).unwrap();
        assert!(iter.next().unwrap());
        iter.end();

        let stats = store.stats();
        assert_eq!(stats.rollbacks, 1);
        assert_eq!(stats.iterators_opened, 1);
    }

    #[test]
    fn test_reset_stats() {
        let store = metered();

        store.start_atomic_op().unwrap();
        store.add_stream_entry(EntryType(1), b"x").unwrap();
        store.commit_atomic_op().unwrap();

        assert_eq!(store.stats().commits, 1);
        store.reset_stats();
        assert_eq!(store.stats().commits, 0);
        assert_eq!(store.stats().bytes_staged, 0);
    }

    #[test]
    fn test_name_delegates_to_inner() {
        let store = metered();
        assert_eq!(store.name(), "in-memory");
    }

    #[test]
    fn test_wrapper_preserves_contract() {
        let store = metered();

        store.start_atomic_op().unwrap();
        let n = store.add_stream_entry(EntryType(3), b"wrapped").unwrap();
        store.commit_atomic_op().unwrap();

        assert_eq!(store.get_entry(n).unwrap().data, b"wrapped");
        assert_eq!(store.get_header().total_entries, 1);
        assert_eq!(store.inner().get_header().total_entries, 1);
    }
}
