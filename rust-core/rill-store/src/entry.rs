// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Rill stream log - Entry types and frame codec
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Defines the stream entry struct, the tag newtypes, and the canonical
// binary framing shared by every storage implementation. Header byte totals
// are defined in terms of this codec, so two independently driven stores
// always account identically.
//
// On-disk frame format (all integers little-endian):
//   [4 bytes: entry_type (u32)]
//   [8 bytes: number (u64)]
//   [4 bytes: payload_length (u32)]
//   [N bytes: payload]
//   [4 bytes: crc32]                -- over all preceding bytes of the frame

use crc32fast::Hasher as Crc32Hasher;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Maximum allowed payload size: 64 MiB. Any frame declaring a larger
/// payload is treated as corrupted.
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Size of the fixed fields preceding the payload (entry_type + number +
/// payload_length).
pub const FRAME_HEADER_SIZE: usize = 4 + 8 + 4;

/// Size of the trailing integrity marker (crc32).
pub const FRAME_TRAILER_SIZE: usize = 4;

/// Total encoded size of a frame carrying `payload_len` payload bytes.
pub fn frame_size(payload_len: usize) -> u64 {
    (FRAME_HEADER_SIZE + FRAME_TRAILER_SIZE + payload_len) as u64
}

// ---------------------------------------------------------------------------
// EntryType
// ---------------------------------------------------------------------------

/// The producer-chosen tag of a stream entry.
///
/// Tags `1..0xb0` are available to producers. The range starting at `0xb0`
/// is reserved for engine markers; `0xb0` itself tags bookmark marker
/// entries, whose payload is the bookmark label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryType(pub u32);

impl EntryType {
    /// Tag of bookmark marker entries.
    pub const BOOKMARK: EntryType = EntryType(0xb0);

    /// First tag of the reserved range. Producer tags must be below this.
    pub const RESERVED_BASE: u32 = 0xb0;

    /// Returns `true` if this tag may not be staged by a producer.
    pub fn is_reserved(self) -> bool {
        self.0 == 0 || self.0 >= Self::RESERVED_BASE
    }
}

// ---------------------------------------------------------------------------
// StreamType
// ---------------------------------------------------------------------------

/// The application-level type tag of a whole stream, fixed at creation and
/// validated on reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamType(pub u64);

// ---------------------------------------------------------------------------
// StreamEntry
// ---------------------------------------------------------------------------

/// A single committed or staged record in a stream log.
///
/// Entries are immutable once committed and permanently retain their
/// sequence number. Bookmark marker entries interleave with data entries in
/// the same global numbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEntry {
    /// The entry's tag (producer-chosen, or `EntryType::BOOKMARK`).
    pub entry_type: EntryType,

    /// Sequence number, assigned at staging time.
    pub number: u64,

    /// Opaque payload bytes.
    pub data: Vec<u8>,
}

impl StreamEntry {
    /// Create a new entry.
    pub fn new(entry_type: EntryType, number: u64, data: Vec<u8>) -> Self {
        Self {
            entry_type,
            number,
            data,
        }
    }

    /// Payload length in bytes.
    pub fn length(&self) -> u32 {
        self.data.len() as u32
    }

    /// Size of this entry's encoded frame.
    pub fn encoded_size(&self) -> u64 {
        frame_size(self.data.len())
    }

    /// Serialize this entry to the canonical frame format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.encoded_size() as usize);

        buffer.extend_from_slice(&self.entry_type.0.to_le_bytes());
        buffer.extend_from_slice(&self.number.to_le_bytes());
        buffer.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        buffer.extend_from_slice(&self.data);

        let crc = compute_crc32(&buffer);
        buffer.extend_from_slice(&crc.to_le_bytes());

        buffer
    }

    /// Deserialize a frame from a byte slice that starts at the frame's
    /// first byte.
    ///
    /// `offset` is the absolute position of the frame in the underlying
    /// store, used only for error reporting.
    pub fn decode(data: &[u8], offset: u64) -> StoreResult<Self> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(StoreError::TruncatedFrame { offset });
        }

        let entry_type = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let number = u64::from_le_bytes(data[4..12].try_into().unwrap());
        let length = u32::from_le_bytes(data[12..16].try_into().unwrap());

        if length > MAX_PAYLOAD_SIZE {
            return Err(StoreError::FrameTooLarge {
                number,
                length,
                max_length: MAX_PAYLOAD_SIZE,
            });
        }

        let payload_end = FRAME_HEADER_SIZE + length as usize;
        if data.len() < payload_end + FRAME_TRAILER_SIZE {
            return Err(StoreError::TruncatedFrame { offset });
        }

        let stored_crc =
            u32::from_le_bytes(data[payload_end..payload_end + 4].try_into().unwrap());
        let computed_crc = compute_crc32(&data[..payload_end]);
        if stored_crc != computed_crc {
            return Err(StoreError::CrcMismatch {
                number,
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        Ok(Self {
            entry_type: EntryType(entry_type),
            number,
            data: data[FRAME_HEADER_SIZE..payload_end].to_vec(),
        })
    }
}

/// Compute a CRC32 checksum over the given byte slice using the IEEE
/// polynomial (same as zlib/gzip).
pub fn compute_crc32(data: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
