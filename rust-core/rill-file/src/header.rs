// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Rill stream log - Header page codec
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The first 64 bytes of a stream file hold the header page: the stream's
// identity and its committed totals. The page is rewritten in place as the
// final step of every commit; a reader that trusts the page never observes
// entries beyond what it acknowledges.
//
// Page layout (all integers little-endian):
//   [ 8 bytes: magic "RILLSTRM"]
//   [ 1 byte:  version (u8)]
//   [ 8 bytes: stream_type (u64)]
//   [ 8 bytes: system_id (u64)]
//   [ 8 bytes: start_number (u64)]
//   [ 8 bytes: total_entries (u64)]
//   [ 8 bytes: total_length (u64)]
//   [ 4 bytes: crc32]              -- over the 49 bytes above
//   [11 bytes: zero padding]

use rill_store::entry::{compute_crc32, StreamType};
use rill_store::error::{StoreError, StoreResult};
use rill_store::header::{Header, StreamOptions};

/// Magic bytes identifying a Rill stream file.
pub const HEADER_MAGIC: &[u8; 8] = b"RILLSTRM";

/// Size of the header page at the start of every stream file. Entry frames
/// begin immediately after it.
pub const HEADER_PAGE_SIZE: usize = 64;

/// Byte length of the checksummed fields (magic through total_length).
const CHECKSUMMED_LEN: usize = 8 + 1 + 8 + 8 + 8 + 8 + 8;

/// Serialize a header (plus the stream's start number) to a header page.
pub fn encode_header_page(header: &Header, start_number: u64) -> [u8; HEADER_PAGE_SIZE] {
    let mut page = [0u8; HEADER_PAGE_SIZE];

    page[0..8].copy_from_slice(HEADER_MAGIC);
    page[8] = header.version;
    page[9..17].copy_from_slice(&header.stream_type.0.to_le_bytes());
    page[17..25].copy_from_slice(&header.system_id.to_le_bytes());
    page[25..33].copy_from_slice(&start_number.to_le_bytes());
    page[33..41].copy_from_slice(&header.total_entries.to_le_bytes());
    page[41..49].copy_from_slice(&header.total_length.to_le_bytes());

    let crc = compute_crc32(&page[..CHECKSUMMED_LEN]);
    page[49..53].copy_from_slice(&crc.to_le_bytes());

    page
}

/// Deserialize a header page, returning the header and the stream's start
/// number.
///
/// Fails with `IncompatibleStore` if the magic does not match, and with
/// `CorruptHeader` if the checksum does not cover the content.
pub fn decode_header_page(page: &[u8]) -> StoreResult<(Header, u64)> {
    if page.len() < HEADER_PAGE_SIZE {
        return Err(StoreError::IncompatibleStore {
            reason: format!(
                "file too small for a header page ({} of {HEADER_PAGE_SIZE} bytes)",
                page.len()
            ),
        });
    }

    if &page[0..8] != HEADER_MAGIC {
        return Err(StoreError::IncompatibleStore {
            reason: "missing stream file magic".to_string(),
        });
    }

    let stored_crc = u32::from_le_bytes(page[49..53].try_into().unwrap());
    let computed_crc = compute_crc32(&page[..CHECKSUMMED_LEN]);
    if stored_crc != computed_crc {
        return Err(StoreError::CorruptHeader {
            expected: stored_crc,
            actual: computed_crc,
        });
    }

    let header = Header {
        version: page[8],
        stream_type: StreamType(u64::from_le_bytes(page[9..17].try_into().unwrap())),
        system_id: u64::from_le_bytes(page[17..25].try_into().unwrap()),
        total_entries: u64::from_le_bytes(page[33..41].try_into().unwrap()),
        total_length: u64::from_le_bytes(page[41..49].try_into().unwrap()),
    };
    let start_number = u64::from_le_bytes(page[25..33].try_into().unwrap());

    Ok((header, start_number))
}

/// Validate a decoded header's identity against the options supplied at
/// open time. Any mismatch refuses the open.
pub fn check_options(
    header: &Header,
    start_number: u64,
    options: &StreamOptions,
) -> StoreResult<()> {
    if header.version != options.version {
        return Err(StoreError::IncompatibleStore {
            reason: format!(
                "version mismatch: file has {}, options request {}",
                header.version, options.version
            ),
        });
    }
    if header.system_id != options.system_id {
        return Err(StoreError::IncompatibleStore {
            reason: format!(
                "system id mismatch: file has {}, options request {}",
                header.system_id, options.system_id
            ),
        });
    }
    if header.stream_type != options.stream_type {
        return Err(StoreError::IncompatibleStore {
            reason: format!(
                "stream type mismatch: file has {}, options request {}",
                header.stream_type.0, options.stream_type.0
            ),
        });
    }
    if start_number != options.start_number {
        return Err(StoreError::IncompatibleStore {
            reason: format!(
                "start number mismatch: file has {}, options request {}",
                start_number, options.start_number
            ),
        });
    }
    Ok(())
}
