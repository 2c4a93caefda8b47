use byteorder::{ByteOrder, LittleEndian};
use sha1::{Digest, Sha1};

use crate::error::StorageError;

/// Size of the database header that precedes the first section.
pub const HEADER_LEN: usize = 32;

/// Size of each of the two signature fragments embedded in the header.
pub const SIGNATURE_LEN: usize = 8;

/// Database header (32 bytes, little-endian).
///
/// Layout:
/// - `[0..8)`   signature fragment
/// - `[8..12)`  item count
/// - `[12..16)` shard bits (`N`)
/// - `[16..20)` shard capacity (`S`)
/// - `[20..24)` identity hash width in bytes
/// - `[24..32)` signature fragment (must match the leading one)
///
/// The signature only guards against reading a file written by a different
/// schema; it is not a content checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbHeader {
    pub signature: [u8; SIGNATURE_LEN],
    pub item_count: u32,
    pub shard_bits: u32,
    pub shard_capacity: u32,
    pub hash_len: u32,
}

impl DbHeader {
    pub fn encode(&self) -> Result<[u8; HEADER_LEN], StorageError> {
        let mut out = [0u8; HEADER_LEN];
        out[0..8].copy_from_slice(&self.signature);
        LittleEndian::write_i32(&mut out[8..12], to_i32("item count", self.item_count)?);
        LittleEndian::write_i32(&mut out[12..16], to_i32("shard bits", self.shard_bits)?);
        LittleEndian::write_i32(
            &mut out[16..20],
            to_i32("shard capacity", self.shard_capacity)?,
        );
        LittleEndian::write_i32(&mut out[20..24], to_i32("hash width", self.hash_len)?);
        out[24..32].copy_from_slice(&self.signature);
        Ok(out)
    }

    /// Decodes a header, rejecting it unless both signature fragments equal
    /// `expected_signature`.
    pub fn decode(
        bytes: &[u8],
        expected_signature: &[u8; SIGNATURE_LEN],
    ) -> Result<Self, StorageError> {
        if bytes.len() < HEADER_LEN {
            return Err(StorageError::Truncated {
                expected: HEADER_LEN,
                found: bytes.len(),
            });
        }

        if &bytes[0..8] != expected_signature || &bytes[24..32] != expected_signature {
            return Err(StorageError::SignatureMismatch);
        }

        Ok(Self {
            signature: *expected_signature,
            item_count: from_i32(LittleEndian::read_i32(&bytes[8..12]), "negative item count")?,
            shard_bits: from_i32(LittleEndian::read_i32(&bytes[12..16]), "negative shard bits")?,
            shard_capacity: from_i32(
                LittleEndian::read_i32(&bytes[16..20]),
                "negative shard capacity",
            )?,
            hash_len: from_i32(LittleEndian::read_i32(&bytes[20..24]), "negative hash width")?,
        })
    }
}

/// Derives the signature fragment for a format identifier (e.g.
/// `"deptrackr-db/v1"`): the first [`SIGNATURE_LEN`] bytes of its SHA-1.
pub fn signature_for(format_id: &str) -> [u8; SIGNATURE_LEN] {
    let digest = Sha1::digest(format_id.as_bytes());
    let mut out = [0u8; SIGNATURE_LEN];
    out.copy_from_slice(&digest[..SIGNATURE_LEN]);
    out
}

fn to_i32(what: &'static str, value: u32) -> Result<i32, StorageError> {
    i32::try_from(value).map_err(|_| StorageError::TooLarge {
        what,
        len: value as usize,
    })
}

fn from_i32(value: i32, reason: &'static str) -> Result<u32, StorageError> {
    u32::try_from(value).map_err(|_| StorageError::InvalidHeader(reason))
}
