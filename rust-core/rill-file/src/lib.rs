// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rill File-Backed Storage Engine
//
// The canonical durable implementation of the Rill storage contract. A
// stream is one file — a fixed 64-byte header page followed by an
// append-only sequence of CRC32-protected frames — plus a redb sidecar
// accelerating bookmark lookups.
//
// # On-disk layout
//
// ```text
// <stream file>
//   [64 bytes: header page]      -- magic, identity, committed totals, CRC32
//   [frame 0][frame 1]...        -- canonical rill-store frames, back to back
// <stream file>.idx              -- redb database: bookmark label -> number
// ```
//
// # Crash consistency
//
// A commit appends and fsyncs the staged frames, commits the bookmark
// index, and only then rewrites and fsyncs the header page. The header is
// therefore the commit boundary: on open, everything it acknowledges must
// decode cleanly, anything beyond it is truncated, and the index is
// rebuilt from the log's marker entries whenever the two disagree. The log
// is the source of truth; the index is an accelerant.
//
// # Example
//
// ```no_run
// use rill_file::FileStore;
// use rill_store::entry::{EntryType, StreamType};
// use rill_store::header::StreamOptions;
// use rill_store::store::StreamStore;
//
// let store = FileStore::open(
//     "/var/lib/rill/sequencer.bin",
//     StreamOptions::new(1, 137, StreamType(1)),
// ).unwrap();
//
// store.start_atomic_op().unwrap();
// let number = store.add_stream_entry(EntryType(1), b"payload").unwrap();
// store.add_stream_bookmark(b"batch-42").unwrap();
// store.commit_atomic_op().unwrap();
//
// assert_eq!(store.get_entry(number).unwrap().data, b"payload");
// ```

pub mod header;
pub mod index;
pub mod store;

// Re-export the primary public API for ergonomic imports.
pub use header::{HEADER_MAGIC, HEADER_PAGE_SIZE};
pub use index::BookmarkIndex;
pub use store::FileStore;
