// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Rill stream log - Atomic operation buffer
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory staging area for the entries and bookmarks added between
// `start_atomic_op` and `commit_atomic_op`/`rollback_atomic_op`. Nothing
// staged here is visible to readers; the buffer owns the pending sequence
// cursor and the pre-operation header snapshot, so rollback is a plain
// drop and commit accounting is pure arithmetic.

use crate::entry::{EntryType, StreamEntry};
use crate::error::{StoreError, StoreResult};
use crate::header::Header;

/// The staging buffer of one open atomic operation.
///
/// Owned by the store instance; exactly one may exist at a time. Sequence
/// numbers are assigned in staging order, continuing from the durable
/// cursor captured at `open`.
#[derive(Debug)]
pub struct OpBuffer {
    /// Header snapshot taken when the operation was opened.
    base_header: Header,

    /// The next number the pending cursor will assign.
    next_pending: u64,

    /// Staged entries, in staging order. Bookmark markers interleave here.
    staged: Vec<StreamEntry>,

    /// Staged label-to-number associations, in staging order.
    staged_bookmarks: Vec<(Vec<u8>, u64)>,
}

impl OpBuffer {
    /// Open a buffer seeded with the current durable header and sequence
    /// cursor.
    pub fn open(base_header: Header, next_number: u64) -> Self {
        Self {
            base_header,
            next_pending: next_number,
            staged: Vec::new(),
            staged_bookmarks: Vec::new(),
        }
    }

    /// Stage a producer entry. Fails if the tag is reserved; otherwise
    /// assigns and returns the next pending number.
    pub fn stage_entry(&mut self, entry_type: EntryType, data: &[u8]) -> StoreResult<u64> {
        if entry_type.is_reserved() {
            return Err(StoreError::ReservedEntryType(entry_type.0));
        }
        Ok(self.stage_raw(entry_type, data.to_vec()))
    }

    /// Stage a bookmark: a marker entry carrying the label as payload plus
    /// a label-to-number association, both consuming one number from the
    /// shared sequence.
    pub fn stage_bookmark(&mut self, label: &[u8]) -> u64 {
        let number = self.stage_raw(EntryType::BOOKMARK, label.to_vec());
        self.staged_bookmarks.push((label.to_vec(), number));
        number
    }

    fn stage_raw(&mut self, entry_type: EntryType, data: Vec<u8>) -> u64 {
        let number = self.next_pending;
        self.staged.push(StreamEntry::new(entry_type, number, data));
        self.next_pending += 1;
        number
    }

    /// The header snapshot taken at `open`.
    pub fn base_header(&self) -> &Header {
        &self.base_header
    }

    /// Staged entries in staging order.
    pub fn staged_entries(&self) -> &[StreamEntry] {
        &self.staged
    }

    /// Staged label-to-number associations in staging order.
    pub fn staged_bookmarks(&self) -> &[(Vec<u8>, u64)] {
        &self.staged_bookmarks
    }

    /// Total encoded byte size of all staged entries.
    pub fn staged_bytes(&self) -> u64 {
        self.staged.iter().map(StreamEntry::encoded_size).sum()
    }

    /// The header the stream will carry once this buffer is committed.
    pub fn committed_header(&self) -> Header {
        let mut header = self.base_header;
        header.total_entries += self.staged.len() as u64;
        header.total_length += self.staged_bytes();
        header
    }

    /// Number of staged entries.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Returns `true` if nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}
