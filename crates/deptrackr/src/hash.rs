use std::cmp::Ordering;
use std::fmt;

/// Width of identity and change hashes in bytes.
pub const HASH_LEN: usize = 20;

/// A fixed-width digest identifying an item (identity hash) or the state of
/// its content (change hash).
///
/// The store never computes these; callers hash whatever defines an item.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ItemHash([u8; HASH_LEN]);

impl ItemHash {
    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns `None` unless `bytes` is exactly [`HASH_LEN`] long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// First two bytes, big-endian; the shard index selects buckets from its top bits.
    pub(crate) fn prefix(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }
}

/// Byte-by-byte comparison over the full hash width, ordered by the first
/// differing byte.
pub fn compare(a: &ItemHash, b: &ItemHash) -> Ordering {
    for (x, y) in a.0.iter().zip(b.0.iter()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

impl Ord for ItemHash {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl PartialOrd for ItemHash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<[u8; HASH_LEN]> for ItemHash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ItemHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ItemHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemHash({self})")
    }
}
