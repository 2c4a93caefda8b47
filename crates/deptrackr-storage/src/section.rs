use byteorder::{ByteOrder, LittleEndian};
use sha1::{Digest, Sha1};

use crate::error::StorageError;

/// Size of a section header: `10 + 4 + 4 + 4 + 10` bytes.
pub const SECTION_HEADER_LEN: usize = 32;

const NAME_HALF: usize = 10;

/// Header preceding every section payload.
///
/// The SHA-1 of the section name is split around the three size fields; both
/// halves must match on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub name_hash: [u8; 20],
    pub element_count: i32,
    pub element_size: i32,
    pub total_bytes: i32,
}

impl SectionHeader {
    pub fn new(
        name: &str,
        element_count: usize,
        element_size: usize,
    ) -> Result<Self, StorageError> {
        let total = element_count
            .checked_mul(element_size)
            .ok_or(StorageError::TooLarge {
                what: "section size",
                len: usize::MAX,
            })?;
        Ok(Self {
            name_hash: section_name_hash(name),
            element_count: fit_i32("section element count", element_count)?,
            element_size: fit_i32("section element size", element_size)?,
            total_bytes: fit_i32("section size", total)?,
        })
    }

    pub fn encode(&self) -> [u8; SECTION_HEADER_LEN] {
        let mut out = [0u8; SECTION_HEADER_LEN];
        out[0..10].copy_from_slice(&self.name_hash[..NAME_HALF]);
        LittleEndian::write_i32(&mut out[10..14], self.element_count);
        LittleEndian::write_i32(&mut out[14..18], self.element_size);
        LittleEndian::write_i32(&mut out[18..22], self.total_bytes);
        out[22..32].copy_from_slice(&self.name_hash[NAME_HALF..]);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() < SECTION_HEADER_LEN {
            return Err(StorageError::Truncated {
                expected: SECTION_HEADER_LEN,
                found: bytes.len(),
            });
        }
        let mut name_hash = [0u8; 20];
        name_hash[..NAME_HALF].copy_from_slice(&bytes[0..10]);
        name_hash[NAME_HALF..].copy_from_slice(&bytes[22..32]);
        Ok(Self {
            name_hash,
            element_count: LittleEndian::read_i32(&bytes[10..14]),
            element_size: LittleEndian::read_i32(&bytes[14..18]),
            total_bytes: LittleEndian::read_i32(&bytes[18..22]),
        })
    }

    /// Checks that the header belongs to `name` and describes a consistent
    /// `element_count * element_size == total_bytes` payload of elements of
    /// `expected_element_size` bytes. Returns the payload length.
    pub fn check(&self, name: &str, expected_element_size: usize) -> Result<usize, StorageError> {
        if self.name_hash != section_name_hash(name) {
            return Err(StorageError::SectionNameMismatch {
                expected: name.to_owned(),
            });
        }

        let shape_error = || StorageError::SectionShape {
            name: name.to_owned(),
            element_count: self.element_count,
            element_size: self.element_size,
            total_bytes: self.total_bytes,
        };

        let (Ok(count), Ok(size), Ok(total)) = (
            usize::try_from(self.element_count),
            usize::try_from(self.element_size),
            usize::try_from(self.total_bytes),
        ) else {
            return Err(shape_error());
        };

        if size != expected_element_size || count.checked_mul(size) != Some(total) {
            return Err(shape_error());
        }

        Ok(total)
    }
}

pub fn section_name_hash(name: &str) -> [u8; 20] {
    let digest = Sha1::digest(name.as_bytes());
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

fn fit_i32(what: &'static str, len: usize) -> Result<i32, StorageError> {
    i32::try_from(len).map_err(|_| StorageError::TooLarge { what, len })
}
