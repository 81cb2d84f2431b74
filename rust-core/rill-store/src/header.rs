// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Rill stream log - Header state and stream options
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The header summarizes the durable state of a stream: its identity and
// the committed entry/byte totals. It is mutated exclusively as the final
// step of a successful commit; readers receive immutable snapshots.

use serde::{Deserialize, Serialize};

use crate::entry::StreamType;

/// Persistent summary metadata describing the durable state of a stream.
///
/// `total_entries` and `total_length` reflect exactly the committed
/// entries, bookmark markers included. `total_length` is the sum of
/// canonical encoded frame sizes, so every storage implementation reports
/// the same value for the same committed history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Format version, fixed at creation.
    pub version: u8,

    /// Identifier of the system that owns this stream.
    pub system_id: u64,

    /// Application-level stream type tag.
    pub stream_type: StreamType,

    /// Number of committed entries.
    pub total_entries: u64,

    /// Total encoded byte length of all committed entries.
    pub total_length: u64,
}

/// Construction parameters of a stream store, fixed at creation and
/// validated on every reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Format version.
    pub version: u8,

    /// Identifier of the owning system.
    pub system_id: u64,

    /// Application-level stream type tag.
    pub stream_type: StreamType,

    /// The sequence number assigned to the first entry ever committed.
    pub start_number: u64,
}

impl StreamOptions {
    /// Create options with the default start number of 0.
    pub fn new(version: u8, system_id: u64, stream_type: StreamType) -> Self {
        Self {
            version,
            system_id,
            stream_type,
            start_number: 0,
        }
    }

    /// Override the sequence number of the first entry.
    pub fn with_start_number(mut self, start_number: u64) -> Self {
        self.start_number = start_number;
        self
    }

    /// The header of a freshly created, empty stream.
    pub fn initial_header(&self) -> Header {
        Header {
            version: self.version,
            system_id: self.system_id,
            stream_type: self.stream_type,
            total_entries: 0,
            total_length: 0,
        }
    }

    /// The number the next staged entry would receive, given the current
    /// committed header.
    pub fn next_number(&self, header: &Header) -> u64 {
        self.start_number + header.total_entries
    }
}
