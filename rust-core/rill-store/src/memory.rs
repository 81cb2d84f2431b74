// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Rill stream log - In-memory reference store
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The reference implementation of the storage contract. All committed
// state lives in process memory and is lost on drop. This is the baseline
// the conformance suite compares every other implementation against, and
// it doubles as the store for tests and ephemeral workloads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::entry::{EntryType, StreamEntry};
use crate::error::{StoreError, StoreResult};
use crate::header::{Header, StreamOptions};
use crate::op::OpBuffer;
use crate::store::{StreamIterator, StreamStore};

/// Committed state shared between the store and its iterators.
#[derive(Debug)]
struct MemoryState {
    header: Header,
    entries: Vec<StreamEntry>,
    bookmarks: HashMap<Vec<u8>, u64>,
}

/// An in-memory stream store.
///
/// Committed state sits behind an `RwLock` so any number of readers and
/// iterators can proceed concurrently; the single open atomic operation
/// sits behind its own `Mutex`, enforcing the one-writer discipline.
#[derive(Debug)]
pub struct InMemoryStore {
    options: StreamOptions,
    state: Arc<RwLock<MemoryState>>,
    op: Mutex<Option<OpBuffer>>,
}

impl InMemoryStore {
    /// Create a new, empty in-memory store with the given options.
    pub fn new(options: StreamOptions) -> Self {
        Self {
            options,
            state: Arc::new(RwLock::new(MemoryState {
                header: options.initial_header(),
                entries: Vec::new(),
                bookmarks: HashMap::new(),
            })),
            op: Mutex::new(None),
        }
    }

    /// The options this store was created with.
    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    fn state_read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn state_write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn op_lock(&self) -> MutexGuard<'_, Option<OpBuffer>> {
        self.op.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StreamStore for InMemoryStore {
    fn start_atomic_op(&self) -> StoreResult<()> {
        let mut op = self.op_lock();
        if op.is_some() {
            return Err(StoreError::OperationAlreadyOpen);
        }

        let state = self.state_read();
        let next = self.options.next_number(&state.header);
        *op = Some(OpBuffer::open(state.header, next));

        debug!(next_number = next, "Opened atomic operation");
        Ok(())
    }

    fn add_stream_entry(&self, entry_type: EntryType, data: &[u8]) -> StoreResult<u64> {
        let mut op = self.op_lock();
        let buffer = op.as_mut().ok_or(StoreError::NoOperationOpen)?;
        buffer.stage_entry(entry_type, data)
    }

    fn add_stream_bookmark(&self, label: &[u8]) -> StoreResult<u64> {
        let mut op = self.op_lock();
        let buffer = op.as_mut().ok_or(StoreError::NoOperationOpen)?;
        Ok(buffer.stage_bookmark(label))
    }

    fn commit_atomic_op(&self) -> StoreResult<()> {
        let mut op = self.op_lock();
        let buffer = op.take().ok_or(StoreError::NoOperationOpen)?;

        let mut state = self.state_write();
        for (label, number) in buffer.staged_bookmarks() {
            state.bookmarks.insert(label.clone(), *number);
        }
        let header = buffer.committed_header();
        let staged = buffer.len();
        state.entries.extend(buffer.staged_entries().iter().cloned());
        state.header = header;

        debug!(
            entries = staged,
            total = header.total_entries,
            "Committed atomic operation"
        );
        Ok(())
    }

    fn rollback_atomic_op(&self) -> StoreResult<()> {
        let mut op = self.op_lock();
        let buffer = op.take().ok_or(StoreError::NoOperationOpen)?;

        debug!(discarded = buffer.len(), "Rolled back atomic operation");
        Ok(())
    }

    fn get_entry(&self, number: u64) -> StoreResult<StreamEntry> {
        let state = self.state_read();
        let start = self.options.start_number;
        let end = self.options.next_number(&state.header);
        if number < start || number >= end {
            return Err(StoreError::EntryNotFound(number));
        }
        Ok(state.entries[(number - start) as usize].clone())
    }

    fn get_header(&self) -> Header {
        self.state_read().header
    }

    fn get_bookmark(&self, label: &[u8]) -> StoreResult<u64> {
        self.state_read()
            .bookmarks
            .get(label)
            .copied()
            .ok_or_else(|| StoreError::bookmark_not_found(label))
    }

    fn get_iterator(
        &self,
        start: u64,
        forward: bool,
    ) -> StoreResult<Box<dyn StreamIterator + Send>> {
        if !forward {
            return Err(StoreError::BackwardIteration);
        }

        let state = self.state_read();
        let end = self.options.next_number(&state.header);
        if start < self.options.start_number || start > end {
            return Err(StoreError::InvalidStartPosition { start, end });
        }

        Ok(Box::new(MemoryIterator {
            state: Arc::clone(&self.state),
            start_number: self.options.start_number,
            cursor: start,
            current: None,
            released: false,
        }))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// A forward cursor over an [`InMemoryStore`]'s committed entries.
struct MemoryIterator {
    state: Arc<RwLock<MemoryState>>,
    start_number: u64,
    cursor: u64,
    current: Option<StreamEntry>,
    released: bool,
}

impl StreamIterator for MemoryIterator {
    fn next(&mut self) -> StoreResult<bool> {
        if self.released {
            return Err(StoreError::IteratorReleased);
        }

        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let end = self.start_number + state.header.total_entries;
        if self.cursor >= end {
            return Ok(true);
        }

        let index = (self.cursor - self.start_number) as usize;
        self.current = Some(state.entries[index].clone());
        self.cursor += 1;
        Ok(false)
    }

    fn entry(&self) -> Option<&StreamEntry> {
        self.current.as_ref()
    }

    fn end(&mut self) {
        self.released = true;
    }
}
