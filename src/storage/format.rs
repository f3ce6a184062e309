//! Binary data file format
//!
//! ## File Format
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ File Header (64 bytes)                                        │
//! │   Magic u32 | Version u32 | RecordCount u64 | FileSize u64    │
//! │   FreeOffset u64 | SchemaCRC u32 | Flags u32                  │
//! │   IndexRoot u64 | Reserved (16)                               │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Record Header (64 bytes)                                      │
//! │   DataSize u32 | Flags u32 | Timestamp u64 | CRC u32          │
//! │   FieldCount u32 | Id (36) | Reserved (4)                     │
//! │ Payload (DataSize bytes of JSON) | NUL                        │
//! │   ... repeated for each record ...                            │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Unreachable bytes past FreeOffset (torn appends)              │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian.

use bytes::{Buf, BufMut};

use crate::error::{AtlasError, Result};

// =============================================================================
// Shared Constants
// =============================================================================

/// Magic number identifying an AtlasDB data file ("ADB1")
pub const MAGIC: u32 = 0x4144_4231;

/// Current data file format version
pub const VERSION: u32 = 1;

/// File header size in bytes
pub const FILE_HEADER_SIZE: usize = 64;

/// Record header size in bytes
pub const RECORD_HEADER_SIZE: usize = 64;

/// Length of a hyphenated instance id
pub const ID_LEN: usize = 36;

/// Record flag: the record marks its id as deleted
pub const FLAG_TOMBSTONE: u32 = 0x1;

/// Largest payload a single record may carry (64 MB)
pub const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

/// CRC-32 of a byte slice
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

// =============================================================================
// File Header
// =============================================================================

/// Fixed header at offset 0 of every data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    /// Records appended so far (tombstones and superseded versions included)
    pub record_count: u64,
    /// Logical file size (equals `free_offset` after a clean append)
    pub file_size: u64,
    /// Append cursor: where the next record header goes
    pub free_offset: u64,
    /// CRC-32 of the collection's schema text
    pub schema_checksum: u32,
    pub flags: u32,
    /// Always 0: indexes live in memory
    pub index_root: u64,
}

impl FileHeader {
    /// Header for a freshly created, empty data file
    pub fn new(schema_checksum: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            record_count: 0,
            file_size: FILE_HEADER_SIZE as u64,
            free_offset: FILE_HEADER_SIZE as u64,
            schema_checksum,
            flags: 0,
            index_root: 0,
        }
    }

    pub fn encode(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut out = [0u8; FILE_HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.magic);
        buf.put_u32_le(self.version);
        buf.put_u64_le(self.record_count);
        buf.put_u64_le(self.file_size);
        buf.put_u64_le(self.free_offset);
        buf.put_u32_le(self.schema_checksum);
        buf.put_u32_le(self.flags);
        buf.put_u64_le(self.index_root);
        // remaining 16 bytes stay zero (reserved)
        out
    }

    /// Decode and validate a header.
    ///
    /// A magic or version mismatch, or a free offset that points inside the
    /// header itself, is reported as corruption.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(AtlasError::Corruption(format!(
                "file header truncated: {} of {} bytes",
                bytes.len(),
                FILE_HEADER_SIZE
            )));
        }

        let mut buf = &bytes[..FILE_HEADER_SIZE];
        let header = Self {
            magic: buf.get_u32_le(),
            version: buf.get_u32_le(),
            record_count: buf.get_u64_le(),
            file_size: buf.get_u64_le(),
            free_offset: buf.get_u64_le(),
            schema_checksum: buf.get_u32_le(),
            flags: buf.get_u32_le(),
            index_root: buf.get_u64_le(),
        };

        if header.magic != MAGIC {
            return Err(AtlasError::Corruption(format!(
                "bad magic 0x{:08x} (expected 0x{:08x})",
                header.magic, MAGIC
            )));
        }
        if header.version != VERSION {
            return Err(AtlasError::Corruption(format!(
                "unsupported format version {}",
                header.version
            )));
        }
        if header.free_offset < FILE_HEADER_SIZE as u64 {
            return Err(AtlasError::Corruption(format!(
                "free offset {} inside file header",
                header.free_offset
            )));
        }

        Ok(header)
    }
}

// =============================================================================
// Record Header
// =============================================================================

/// Header preceding each record payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub data_size: u32,
    pub flags: u32,
    /// Unix millis when the record was appended
    pub timestamp: u64,
    /// CRC-32 of the payload
    pub checksum: u32,
    /// Top-level fields in the payload object
    pub field_count: u32,
    pub id: [u8; ID_LEN],
}

impl RecordHeader {
    /// Build a header describing `payload`
    pub fn for_payload(id: &str, payload: &[u8], field_count: u32, flags: u32, timestamp: u64) -> Result<Self> {
        let id_bytes: [u8; ID_LEN] = id.as_bytes().try_into().map_err(|_| {
            AtlasError::Validation(format!("instance id must be {} bytes, got {}", ID_LEN, id.len()))
        })?;

        if payload.len() > MAX_RECORD_SIZE as usize {
            return Err(AtlasError::Validation(format!(
                "document is {} bytes (max {})",
                payload.len(),
                MAX_RECORD_SIZE
            )));
        }

        Ok(Self {
            data_size: payload.len() as u32,
            flags,
            timestamp,
            checksum: checksum(payload),
            field_count,
            id: id_bytes,
        })
    }

    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut out = [0u8; RECORD_HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.data_size);
        buf.put_u32_le(self.flags);
        buf.put_u64_le(self.timestamp);
        buf.put_u32_le(self.checksum);
        buf.put_u32_le(self.field_count);
        buf.put_slice(&self.id);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return Err(AtlasError::Corruption(format!(
                "record header truncated: {} of {} bytes",
                bytes.len(),
                RECORD_HEADER_SIZE
            )));
        }

        let mut buf = &bytes[..RECORD_HEADER_SIZE];
        let data_size = buf.get_u32_le();
        let flags = buf.get_u32_le();
        let timestamp = buf.get_u64_le();
        let checksum = buf.get_u32_le();
        let field_count = buf.get_u32_le();
        let mut id = [0u8; ID_LEN];
        buf.copy_to_slice(&mut id);

        if data_size > MAX_RECORD_SIZE {
            return Err(AtlasError::Corruption(format!(
                "record size {} exceeds maximum {}",
                data_size, MAX_RECORD_SIZE
            )));
        }

        Ok(Self {
            data_size,
            flags,
            timestamp,
            checksum,
            field_count,
            id,
        })
    }

    /// Instance id as text
    pub fn id_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.id)
            .map_err(|_| AtlasError::Corruption("record id is not UTF-8".to_string()))
    }

    pub fn is_tombstone(&self) -> bool {
        self.flags & FLAG_TOMBSTONE != 0
    }

    /// Bytes this record occupies on disk: header + payload + NUL
    pub fn total_len(&self) -> u64 {
        RECORD_HEADER_SIZE as u64 + self.data_size as u64 + 1
    }

    /// Check `payload` against the stored checksum
    pub fn verify(&self, payload: &[u8]) -> Result<()> {
        let actual = checksum(payload);
        if actual != self.checksum {
            return Err(AtlasError::Corruption(format!(
                "checksum mismatch for record {}: stored 0x{:08x}, computed 0x{:08x}",
                String::from_utf8_lossy(&self.id),
                self.checksum,
                actual
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "123e4567-e89b-42d3-a456-426614174000";

    #[test]
    fn file_header_layout() {
        let header = FileHeader::new(0xdead_beef);
        let bytes = header.encode();
        assert_eq!(&bytes[0..4], &MAGIC.to_le_bytes());
        assert_eq!(FileHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn file_header_rejects_bad_magic() {
        let mut bytes = FileHeader::new(0).encode();
        bytes[0] ^= 0xff;
        assert!(matches!(FileHeader::decode(&bytes), Err(AtlasError::Corruption(_))));
    }

    #[test]
    fn record_header_detects_payload_change() {
        let payload = br#"{"name":"John"}"#;
        let header = RecordHeader::for_payload(ID, payload, 1, 0, 42).unwrap();
        let decoded = RecordHeader::decode(&header.encode()).unwrap();

        assert_eq!(decoded.id_str().unwrap(), ID);
        assert!(decoded.verify(payload).is_ok());
        assert!(decoded.verify(br#"{"name":"Jane"}"#).is_err());
        assert_eq!(decoded.total_len(), (RECORD_HEADER_SIZE + payload.len() + 1) as u64);
    }

    #[test]
    fn record_header_rejects_short_id() {
        assert!(RecordHeader::for_payload("short", b"{}", 0, 0, 0).is_err());
    }
}
