use std::fs::File;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapOptions};

use crate::error::StorageError;
use crate::header::{DbHeader, HEADER_LEN, SIGNATURE_LEN};
use crate::section::{SectionHeader, SECTION_HEADER_LEN};

enum Backing {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

/// Read-only view of a database file, backed by an mmap region (preferred)
/// or an owned buffer when mapping fails.
pub struct DbFile {
    backing: Backing,
}

impl std::fmt::Debug for DbFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbFile")
            .field("len", &self.bytes().len())
            .field("mapped", &matches!(self.backing, Backing::Mmap(_)))
            .finish()
    }
}

impl DbFile {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len() as usize;
        if file_len < HEADER_LEN {
            return Err(StorageError::Truncated {
                expected: HEADER_LEN,
                found: file_len,
            });
        }

        // Safety: the map is read-only and only lives as long as `DbFile`. The
        // database file is replaced by rename rather than rewritten in place.
        match unsafe { MmapOptions::new().map(&file) } {
            Ok(mmap) => Ok(Self {
                backing: Backing::Mmap(mmap),
            }),
            Err(err) => {
                tracing::debug!(
                    target: "deptrackr.storage",
                    path = %path.display(),
                    error = %err,
                    "mmap failed; reading database into memory"
                );
                let bytes = std::fs::read(path)?;
                Ok(Self {
                    backing: Backing::Owned(bytes),
                })
            }
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Mmap(mmap) => &mmap[..],
            Backing::Owned(bytes) => bytes.as_slice(),
        }
    }
}

/// Sequential reader over a database image: header first, then sections in
/// the order they were written.
#[derive(Debug)]
pub struct DbReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    header: DbHeader,
}

impl<'a> DbReader<'a> {
    pub fn new(
        bytes: &'a [u8],
        expected_signature: &[u8; SIGNATURE_LEN],
    ) -> Result<Self, StorageError> {
        let header = DbHeader::decode(bytes, expected_signature)?;
        Ok(Self {
            bytes,
            pos: HEADER_LEN,
            header,
        })
    }

    pub fn header(&self) -> &DbHeader {
        &self.header
    }

    /// Reads the next section, which must be named `name` and hold elements of
    /// `element_size` bytes. Returns the raw payload.
    pub fn read_raw(&mut self, name: &str, element_size: usize) -> Result<&'a [u8], StorageError> {
        let header_bytes = self.take(SECTION_HEADER_LEN)?;
        let header = SectionHeader::decode(header_bytes)?;
        let total = header.check(name, element_size)?;
        self.take(total)
    }

    /// Reads the next section as little-endian `u32` elements.
    pub fn read_u32s(&mut self, name: &str) -> Result<Vec<u32>, StorageError> {
        let payload = self.read_raw(name, 4)?;
        Ok(payload.chunks_exact(4).map(LittleEndian::read_u32).collect())
    }

    /// Consumes the reader, failing if bytes remain after the last section.
    pub fn finish(self) -> Result<(), StorageError> {
        if self.pos != self.bytes.len() {
            return Err(StorageError::InvalidHeader(
                "trailing bytes after last section",
            ));
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], StorageError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(StorageError::Truncated {
                expected: self.pos.saturating_add(len),
                found: self.bytes.len(),
            })?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }
}
