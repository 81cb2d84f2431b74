// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Rill stream log - Storage contract
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Defines the `StreamStore` trait that all storage implementations must
// satisfy, and the `StreamIterator` trait for forward cursors over the
// committed range. Implementations must be behaviorally interchangeable;
// the conformance suite in [`crate::conformance`] drives two of them
// through identical scripts and asserts identical observables.

use crate::entry::{EntryType, StreamEntry};
use crate::error::StoreResult;
use crate::header::Header;

/// A durable, append-only stream log store.
///
/// Writers group additions into atomic operations: `start_atomic_op`,
/// then any number of `add_stream_entry`/`add_stream_bookmark` calls
/// (staged, invisible to readers), then `commit_atomic_op` (durable,
/// visible) or `rollback_atomic_op` (discarded without trace). At most one
/// atomic operation is open per store instance; a second `start` fails
/// rather than queues.
///
/// Readers only ever observe committed state and need no synchronization
/// with each other. Implementations must be safe to share across threads.
pub trait StreamStore: Send + Sync {
    /// Open a new atomic operation.
    ///
    /// Fails with `OperationAlreadyOpen` if one is active.
    fn start_atomic_op(&self) -> StoreResult<()>;

    /// Stage an entry in the open atomic operation and return its assigned
    /// sequence number.
    ///
    /// Fails with `NoOperationOpen` without an open operation, and with
    /// `ReservedEntryType` for tags at or above `EntryType::RESERVED_BASE`
    /// (or zero). Nothing becomes durable or visible until commit.
    fn add_stream_entry(&self, entry_type: EntryType, data: &[u8]) -> StoreResult<u64>;

    /// Stage a bookmark in the open atomic operation and return the
    /// sequence number of its marker entry.
    ///
    /// The marker consumes a number from the same sequence as data
    /// entries. Fails with `NoOperationOpen` without an open operation.
    fn add_stream_bookmark(&self, label: &[u8]) -> StoreResult<u64>;

    /// Durably commit the open atomic operation, making its entries and
    /// bookmarks visible to all readers.
    ///
    /// Fails with `NoOperationOpen` without an open operation. On an I/O
    /// failure partway through the durable-write sequence the operation
    /// stays open and committed state is unchanged; the next open of the
    /// store recovers to an all-or-nothing state.
    fn commit_atomic_op(&self) -> StoreResult<()>;

    /// Discard the open atomic operation.
    ///
    /// Resets the pending sequence cursor to its pre-operation value and
    /// leaves all durable state untouched. Fails with `NoOperationOpen`
    /// without an open operation.
    fn rollback_atomic_op(&self) -> StoreResult<()>;

    /// Fetch the committed entry with the given sequence number.
    ///
    /// Fails with `EntryNotFound` for numbers outside the committed range
    /// (including numbers staged in a not-yet-committed operation).
    fn get_entry(&self, number: u64) -> StoreResult<StreamEntry>;

    /// Return a snapshot of the current durable header.
    fn get_header(&self) -> Header;

    /// Resolve a bookmark label to its committed sequence number.
    ///
    /// Fails with `BookmarkNotFound` for unindexed labels.
    fn get_bookmark(&self, label: &[u8]) -> StoreResult<u64>;

    /// Open a forward iterator positioned so the first `next()` yields the
    /// entry at `start`.
    ///
    /// `start` equal to the current end of the committed range is a valid
    /// tailing position; anything greater fails with
    /// `InvalidStartPosition`. `forward == false` fails with
    /// `BackwardIteration`.
    fn get_iterator(&self, start: u64, forward: bool)
        -> StoreResult<Box<dyn StreamIterator + Send>>;

    /// A human-readable name for this implementation, used in logging and
    /// metrics.
    fn name(&self) -> &str;
}

/// A stateful forward cursor over committed entries, supporting bounded
/// reads and live tailing.
pub trait StreamIterator {
    /// Advance the cursor.
    ///
    /// Re-derives the durable commit boundary on every call, so entries
    /// committed by a concurrent writer since the previous call are
    /// observed. Returns `Ok(false)` after loading the entry at the cursor
    /// and advancing past it; `Ok(true)` when the stream is drained up to
    /// the present (not an error — retry later to tail). Fails with a
    /// corruption error if an entry inside the claimed durable range
    /// cannot be loaded, and with `IteratorReleased` after `end()`.
    fn next(&mut self) -> StoreResult<bool>;

    /// The most recently successfully loaded entry, including after
    /// `next()` returned `Ok(true)`. `None` before the first successful
    /// `next()`.
    fn entry(&self) -> Option<&StreamEntry>;

    /// Release any resources held by the iterator. Idempotent.
    fn end(&mut self);
}
