// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Rill stream log - Error types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Defines all error conditions a stream store can report: atomic-operation
// protocol misuse, not-found lookups, on-disk corruption, identity
// mismatches at open time, and environment failures. Misuse and not-found
// errors are recoverable by the caller; corruption and incompatibility are
// fatal for the store instance and are never auto-repaired on read paths.

use thiserror::Error;

/// Errors that can occur during stream store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `start_atomic_op` was called while an operation is already open.
    #[error("an atomic operation is already open")]
    OperationAlreadyOpen,

    /// A staging, commit, or rollback call was made with no open operation.
    #[error("no atomic operation is open")]
    NoOperationOpen,

    /// The requested entry number is not part of the committed stream.
    #[error("entry {0} not found")]
    EntryNotFound(u64),

    /// The requested bookmark label is not indexed.
    #[error("bookmark not found: {0}")]
    BookmarkNotFound(String),

    /// An iterator was requested at a position beyond the stream's logical
    /// range. `end` is the first number a future commit would assign, which
    /// is itself a valid tailing position.
    #[error("invalid iterator start position {start}: stream ends at {end}")]
    InvalidStartPosition {
        /// The requested start position.
        start: u64,
        /// The current end of the committed range.
        end: u64,
    },

    /// A producer tried to stage an entry with a tag reserved for engine
    /// markers (or the invalid tag zero).
    #[error("entry type {0:#x} is reserved for internal use")]
    ReservedEntryType(u32),

    /// Backward iteration was requested; only forward cursors exist.
    #[error("backward iteration is not supported")]
    BackwardIteration,

    /// The iterator was used after `end()` released it.
    #[error("iterator has been released")]
    IteratorReleased,

    /// CRC32 mismatch detected while decoding a frame. Indicates on-disk
    /// corruption, either from media failure or an incomplete write.
    #[error("CRC mismatch at entry {number}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// The sequence number read from the corrupted frame.
        number: u64,
        /// The CRC32 value stored in the frame trailer.
        expected: u32,
        /// The CRC32 value computed from the frame content.
        actual: u32,
    },

    /// A frame is cut short of its declared length.
    #[error("truncated frame at offset {offset}")]
    TruncatedFrame {
        /// The byte offset where the truncation was detected.
        offset: u64,
    },

    /// A frame declares a payload length exceeding the maximum allowed.
    #[error("entry {number} declares length {length} bytes, exceeding maximum {max_length}")]
    FrameTooLarge {
        /// The sequence number read from the frame header.
        number: u64,
        /// The declared payload length.
        length: u32,
        /// The maximum allowed payload length.
        max_length: u32,
    },

    /// The header page checksum does not match its content.
    #[error("header page checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CorruptHeader {
        /// The CRC32 value stored in the header page.
        expected: u32,
        /// The CRC32 value computed from the header fields.
        actual: u32,
    },

    /// The durable state is internally inconsistent (e.g. the header
    /// acknowledges entries the log does not contain).
    #[error("corrupt stream store: {0}")]
    CorruptStore(String),

    /// The store's identity (version, system id, stream type, start
    /// number) does not match the options supplied at open time.
    #[error("incompatible stream store: {reason}")]
    IncompatibleStore {
        /// Which identity field mismatched, with expected and found values.
        reason: String,
    },

    /// The persistent bookmark index failed.
    #[error("bookmark index error: {0}")]
    Index(String),
}

impl StoreError {
    /// Build a `BookmarkNotFound` error from a raw label.
    pub fn bookmark_not_found(label: &[u8]) -> Self {
        Self::BookmarkNotFound(String::from_utf8_lossy(label).into_owned())
    }

    /// Returns `true` if this error indicates durable-state corruption,
    /// which is fatal for the store instance.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CrcMismatch { .. }
                | Self::TruncatedFrame { .. }
                | Self::FrameTooLarge { .. }
                | Self::CorruptHeader { .. }
                | Self::CorruptStore(_)
        )
    }
}

/// Convenience type alias for stream store results.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_crc_mismatch() {
        let error = StoreError::CrcMismatch {
            number: 42,
            expected: 0xDEADBEEF,
            actual: 0xCAFEBABE,
        };
        let message = format!("{error}");
        assert!(message.contains("42"));
        assert!(message.contains("0xdeadbeef"));
        assert!(message.contains("0xcafebabe"));
    }

    #[test]
    fn test_error_display_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file gone");
        let error = StoreError::Io(io_error);
        assert!(format!("{error}").contains("file gone"));
    }

    #[test]
    fn test_error_display_invalid_start() {
        let error = StoreError::InvalidStartPosition { start: 12, end: 7 };
        let message = format!("{error}");
        assert!(message.contains("12"));
        assert!(message.contains('7'));
    }

    #[test]
    fn test_bookmark_not_found_lossy_label() {
        let error = StoreError::bookmark_not_found(b"genesis");
        assert_eq!(format!("{error}"), "bookmark not found: genesis");
    }

    #[test]
    fn test_is_corruption() {
        assert!(StoreError::TruncatedFrame { offset: 0 }.is_corruption());
        assert!(StoreError::CorruptStore("totals".into()).is_corruption());
        assert!(!StoreError::NoOperationOpen.is_corruption());
        assert!(!StoreError::EntryNotFound(3).is_corruption());
    }
}
