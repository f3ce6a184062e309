//! Data file access
//!
//! Appends records at the header's free offset and walks them back in
//! order. The file header is always written last, so an append torn by a
//! crash leaves `free_offset` where it was and the partial bytes are never
//! reached by a scan.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};

use crate::config::SyncStrategy;
use crate::error::{AtlasError, Result};

use super::format::{FileHeader, RecordHeader, FILE_HEADER_SIZE, RECORD_HEADER_SIZE};

/// A record read back from the data file
#[derive(Debug, Clone)]
pub struct StoredRecord {
    /// Offset of the record header
    pub offset: u64,
    pub header: RecordHeader,
    /// JSON payload (without the trailing NUL)
    pub payload: Vec<u8>,
}

/// Record-level view over an open data file handle
pub struct DataFile<'a> {
    file: &'a File,
    sync_strategy: SyncStrategy,
}

impl<'a> DataFile<'a> {
    pub fn new(file: &'a File, sync_strategy: SyncStrategy) -> Self {
        Self {
            file,
            sync_strategy,
        }
    }

    /// Read the file header.
    ///
    /// Returns `Ok(None)` for an empty file and a corruption error when the
    /// header does not decode.
    pub fn read_header(&self) -> Result<Option<FileHeader>> {
        let len = self.file.metadata()?.len();
        if len == 0 {
            return Ok(None);
        }

        let mut bytes = [0u8; FILE_HEADER_SIZE];
        let mut reader = self.file;
        reader.seek(SeekFrom::Start(0))?;
        if let Err(e) = reader.read_exact(&mut bytes) {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return Err(AtlasError::Corruption(format!(
                    "data file is {} bytes, shorter than its header",
                    len
                )));
            }
            return Err(e.into());
        }

        FileHeader::decode(&bytes).map(Some)
    }

    /// Read the header, writing a fresh one if the file is empty or corrupt
    pub fn header_or_init(&self, schema_checksum: u32) -> Result<FileHeader> {
        match self.read_header() {
            Ok(Some(header)) => Ok(header),
            Ok(None) => self.init_header(schema_checksum),
            Err(AtlasError::Corruption(reason)) => {
                tracing::warn!("Reinitializing data file header: {}", reason);
                self.init_header(schema_checksum)
            }
            Err(e) => Err(e),
        }
    }

    /// Write an empty-file header
    pub fn init_header(&self, schema_checksum: u32) -> Result<FileHeader> {
        let header = FileHeader::new(schema_checksum);
        self.write_header(&header)?;
        Ok(header)
    }

    pub fn write_header(&self, header: &FileHeader) -> Result<()> {
        let mut writer = self.file;
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&header.encode())?;
        writer.flush()?;
        if self.sync_strategy == SyncStrategy::EveryWrite {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Append one record and advance the header.
    ///
    /// Steps:
    /// 1. Write record header + payload + NUL at `free_offset`
    /// 2. Sync the record bytes (per sync strategy)
    /// 3. Bump `record_count`, `free_offset`, `file_size`
    /// 4. Write the file header
    ///
    /// Returns the offset the record was written at.
    pub fn append(&self, header: &mut FileHeader, record: &RecordHeader, payload: &[u8]) -> Result<u64> {
        let offset = header.free_offset;

        let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len() + 1);
        buf.extend_from_slice(&record.encode());
        buf.extend_from_slice(payload);
        buf.push(0);

        let mut writer = self.file;
        writer.seek(SeekFrom::Start(offset))?;
        writer.write_all(&buf)?;
        writer.flush()?;
        if self.sync_strategy == SyncStrategy::EveryWrite {
            self.file.sync_data()?;
        }

        let mut updated = *header;
        updated.record_count += 1;
        updated.free_offset = offset + buf.len() as u64;
        updated.file_size = updated.free_offset;
        self.write_header(&updated)?;
        *header = updated;

        Ok(offset)
    }

    /// Read and verify the record at `offset`
    pub fn read_at(&self, header: &FileHeader, offset: u64) -> Result<StoredRecord> {
        if offset < FILE_HEADER_SIZE as u64 || offset + RECORD_HEADER_SIZE as u64 > header.free_offset {
            return Err(AtlasError::Corruption(format!(
                "record offset {} outside data region [{}, {})",
                offset, FILE_HEADER_SIZE, header.free_offset
            )));
        }

        let mut reader = self.file;
        reader.seek(SeekFrom::Start(offset))?;

        let mut header_bytes = [0u8; RECORD_HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;
        let record = RecordHeader::decode(&header_bytes)?;

        if offset + record.total_len() > header.free_offset {
            return Err(AtlasError::Corruption(format!(
                "record at {} runs past free offset {}",
                offset, header.free_offset
            )));
        }

        let mut payload = vec![0u8; record.data_size as usize];
        reader.read_exact(&mut payload)?;
        record.verify(&payload)?;

        Ok(StoredRecord {
            offset,
            header: record,
            payload,
        })
    }

    /// Sequential scan over every appended record.
    ///
    /// A missing or corrupt file header yields an empty scan.
    pub fn scan(&self) -> Result<RecordScanner<'a>> {
        let header = match self.read_header() {
            Ok(Some(header)) => header,
            Ok(None) => return Ok(RecordScanner::empty(self.file)),
            Err(AtlasError::Corruption(reason)) => {
                tracing::warn!("Treating data file as empty: {}", reason);
                return Ok(RecordScanner::empty(self.file));
            }
            Err(e) => return Err(e),
        };

        let file_len = self.file.metadata()?.len();
        let mut reader = BufReader::new(self.file);
        reader.seek(SeekFrom::Start(FILE_HEADER_SIZE as u64))?;

        Ok(RecordScanner {
            reader,
            position: FILE_HEADER_SIZE as u64,
            end: header.free_offset.min(file_len),
            remaining: header.record_count,
            done: false,
        })
    }
}

// =============================================================================
// Scanner
// =============================================================================

/// Iterator over the records of a data file, in append order.
///
/// A checksum mismatch yields an `Err` for that record only and the scan
/// moves on to the next one. A header that cannot be decoded, or a record
/// running past the end of the data region, ends the scan.
pub struct RecordScanner<'a> {
    reader: BufReader<&'a File>,
    position: u64,
    end: u64,
    remaining: u64,
    done: bool,
}

impl<'a> RecordScanner<'a> {
    fn empty(file: &'a File) -> Self {
        Self {
            reader: BufReader::new(file),
            position: 0,
            end: 0,
            remaining: 0,
            done: true,
        }
    }

    fn read_next(&mut self) -> Result<StoredRecord> {
        let offset = self.position;
        if offset + RECORD_HEADER_SIZE as u64 > self.end {
            self.done = true;
            return Err(AtlasError::Corruption(format!(
                "record count says {} more record(s) but data ends at {}",
                self.remaining, self.end
            )));
        }

        let mut header_bytes = [0u8; RECORD_HEADER_SIZE];
        self.reader.read_exact(&mut header_bytes)?;
        let header = match RecordHeader::decode(&header_bytes) {
            Ok(header) => header,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        if offset + header.total_len() > self.end {
            self.done = true;
            return Err(AtlasError::Corruption(format!(
                "record at {} runs past end of data {}",
                offset, self.end
            )));
        }

        let mut payload = vec![0u8; header.data_size as usize];
        self.reader.read_exact(&mut payload)?;
        let mut terminator = [0u8; 1];
        self.reader.read_exact(&mut terminator)?;
        self.position = offset + header.total_len();

        header.verify(&payload)?;

        Ok(StoredRecord {
            offset,
            header,
            payload,
        })
    }
}

impl Iterator for RecordScanner<'_> {
    type Item = Result<StoredRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let item = self.read_next();
        if let Err(AtlasError::Io(_)) = &item {
            self.done = true;
        }
        Some(item)
    }
}
