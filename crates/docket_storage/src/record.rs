//! Log record framing for [`crate::LogStore`].
//!
//! Each committed batch becomes exactly one record:
//!
//! ```text
//! | magic (4) | version (2) | kind (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! The payload is the CBOR encoding of the batch's operations. The CRC covers
//! the header and the payload. All integers are little-endian.

use crate::error::{StorageError, StorageResult};
use crate::store::BatchOp;

/// Magic bytes at the start of every record.
pub const LOG_MAGIC: [u8; 4] = *b"DKLG";

/// Current record format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4)
pub const HEADER_SIZE: usize = 11;

/// Size of the trailing checksum.
pub const CRC_SIZE: usize = 4;

/// What a record's operations represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Operations of one committed batch.
    Batch,
    /// Full contents of the store, written by compaction.
    Snapshot,
}

impl RecordKind {
    /// Converts from the on-disk byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Batch),
            2 => Some(Self::Snapshot),
            _ => None,
        }
    }

    /// Converts to the on-disk byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Batch => 1,
            Self::Snapshot => 2,
        }
    }
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Record kind.
    pub kind: RecordKind,
    /// Operations carried by the record.
    pub ops: Vec<BatchOp>,
}

/// Outcome of reading one record from a buffer.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete, valid record and its encoded length.
    Record(LogRecord, usize),
    /// The buffer ends inside a record.
    Torn,
}

impl LogRecord {
    /// Encodes the record into its framed representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the operations cannot be serialized or the
    /// payload does not fit the length field.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let mut payload = Vec::new();
        ciborium::into_writer(&self.ops, &mut payload)
            .map_err(|e| StorageError::encoding(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| StorageError::encoding("batch exceeds 4 GiB"))?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        buf.extend_from_slice(&LOG_MAGIC);
        buf.extend_from_slice(&LOG_VERSION.to_le_bytes());
        buf.push(self.kind.as_byte());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&payload);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Reads the record that starts at `offset` in `data`.
    ///
    /// # Errors
    ///
    /// Returns an error on bad magic, an unknown version or kind, a checksum
    /// mismatch, or an undecodable payload.
    pub fn read(data: &[u8], offset: usize) -> StorageResult<ReadOutcome> {
        let rest = &data[offset..];
        if rest.len() < HEADER_SIZE {
            return Ok(ReadOutcome::Torn);
        }
        if rest[0..4] != LOG_MAGIC {
            return Err(StorageError::corrupted(format!(
                "invalid magic at offset {offset}"
            )));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version > LOG_VERSION {
            return Err(StorageError::corrupted(format!(
                "unsupported version {version} at offset {offset}"
            )));
        }
        let kind = RecordKind::from_byte(rest[6]).ok_or_else(|| {
            StorageError::corrupted(format!(
                "unknown record kind {} at offset {offset}",
                rest[6]
            ))
        })?;
        let len = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]) as usize;

        let total = HEADER_SIZE + len + CRC_SIZE;
        if rest.len() < total {
            return Ok(ReadOutcome::Torn);
        }

        let payload_end = HEADER_SIZE + len;
        let stored = u32::from_le_bytes([
            rest[payload_end],
            rest[payload_end + 1],
            rest[payload_end + 2],
            rest[payload_end + 3],
        ]);
        let computed = compute_crc32(&rest[..payload_end]);
        if stored != computed {
            return Err(StorageError::ChecksumMismatch {
                offset: offset as u64,
                expected: stored,
                actual: computed,
            });
        }

        let ops: Vec<BatchOp> = ciborium::from_reader(&rest[HEADER_SIZE..payload_end])
            .map_err(|e| StorageError::encoding(e.to_string()))?;
        Ok(ReadOutcome::Record(Self { kind, ops }, total))
    }
}

/// Computes the IEEE CRC32 of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}
