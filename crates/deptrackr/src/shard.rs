use crate::config::MAX_SHARD_CAPACITY;
use crate::error::StoreError;
use crate::hash::ItemHash;

/// Sentinel for an unallocated bucket offset and for unused bucket slots.
pub(crate) const EMPTY_SLOT: u32 = u32::MAX;

/// Fixed-shard hash index mapping identity hashes to item indices.
///
/// `2^bits` buckets, each with room for `capacity` entries. A bucket's slots
/// are allocated (filled with [`EMPTY_SLOT`]) on first insert, after which the
/// bucket only grows by appending. Appends set the bucket's dirty bit; the
/// next lookup sorts the bucket by identity hash and clears the bit, then
/// binary-searches. Unsorted buckets are never searched.
///
/// Buckets never grow past `capacity`; an insert into a full bucket fails.
#[derive(Debug)]
pub(crate) struct ShardIndex {
    bits: u32,
    capacity: u32,
    offsets: Vec<u32>,
    sizes: Vec<u32>,
    dirty: Vec<u32>,
    slots: Vec<u32>,
}

/// Owned columns of a [`ShardIndex`], as persisted.
#[derive(Debug)]
pub(crate) struct ShardParts {
    pub bits: u32,
    pub capacity: u32,
    pub offsets: Vec<u32>,
    pub sizes: Vec<u32>,
    pub dirty: Vec<u32>,
    pub slots: Vec<u32>,
}

impl ShardIndex {
    /// `bits` must be in `1..=16` and `capacity` in `1..=MAX_SHARD_CAPACITY`
    /// (see `StoreConfig::validate`).
    pub fn new(bits: u32, capacity: u32, reserve_buckets: usize) -> Self {
        let buckets = 1usize << bits;
        Self {
            bits,
            capacity,
            offsets: vec![EMPTY_SLOT; buckets],
            sizes: vec![0; buckets],
            dirty: vec![0; bitset_words(buckets)],
            slots: Vec::with_capacity(reserve_buckets.min(buckets) * capacity as usize),
        }
    }

    /// Rebuilds an index from persisted columns, checking every offset and
    /// slot against `ids` so later lookups cannot index out of bounds.
    ///
    /// Every item must be filed exactly once, and no two items may share an
    /// identity hash.
    pub fn from_parts(parts: ShardParts, ids: &[ItemHash]) -> Result<Self, StoreError> {
        let ShardParts {
            bits,
            capacity,
            offsets,
            sizes,
            dirty,
            slots,
        } = parts;

        if !(1..=16).contains(&bits) || !(1..=MAX_SHARD_CAPACITY).contains(&capacity) {
            return Err(StoreError::corrupt(format!(
                "invalid shard parameters: bits={bits}, capacity={capacity}"
            )));
        }
        let buckets = 1usize << bits;
        if offsets.len() != buckets || sizes.len() != buckets {
            return Err(StoreError::corrupt("shard table length mismatch"));
        }
        if dirty.len() != bitset_words(buckets) {
            return Err(StoreError::corrupt("dirty bitset length mismatch"));
        }
        if slots.len() % capacity as usize != 0 {
            return Err(StoreError::corrupt("shard slots are not whole buckets"));
        }

        let index = Self {
            bits,
            capacity,
            offsets,
            sizes,
            dirty,
            slots,
        };

        let mut filed = vec![false; ids.len()];
        let mut total = 0usize;
        for bucket in 0..buckets {
            let offset = index.offsets[bucket];
            let size = index.sizes[bucket];
            if offset == EMPTY_SLOT {
                if size != 0 {
                    return Err(StoreError::corrupt(format!(
                        "unallocated bucket {bucket} has {size} entries"
                    )));
                }
                continue;
            }
            let end = offset as usize + capacity as usize;
            if end > index.slots.len() || size > capacity {
                return Err(StoreError::corrupt(format!("bucket {bucket} out of bounds")));
            }
            for &item in index.entries(bucket) {
                let Some(hash) = ids.get(item as usize) else {
                    return Err(StoreError::corrupt(format!(
                        "bucket {bucket} references unknown item {item}"
                    )));
                };
                if index.bucket_of(hash) != bucket {
                    return Err(StoreError::corrupt(format!(
                        "item {item} is filed under the wrong bucket {bucket}"
                    )));
                }
                if std::mem::replace(&mut filed[item as usize], true) {
                    return Err(StoreError::corrupt(format!("item {item} is filed twice")));
                }
            }

            let mut hashes: Vec<&ItemHash> = index
                .entries(bucket)
                .iter()
                .map(|&item| &ids[item as usize])
                .collect();
            hashes.sort_unstable();
            if hashes.windows(2).any(|pair| pair[0] == pair[1]) {
                return Err(StoreError::corrupt(format!(
                    "bucket {bucket} holds a duplicate identity hash"
                )));
            }
            total += size as usize;
        }
        if total != ids.len() {
            return Err(StoreError::corrupt(format!(
                "shard index holds {total} entries for {} items",
                ids.len()
            )));
        }

        Ok(index)
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// `bucket = (hash[0] << 8 | hash[1]) >> (16 - bits)`.
    pub fn bucket_of(&self, hash: &ItemHash) -> usize {
        (hash.prefix() >> (16 - self.bits)) as usize
    }

    /// Number of free slots left in `bucket`.
    pub fn remaining(&self, bucket: usize) -> u32 {
        self.capacity - self.sizes[bucket]
    }

    pub fn insert(&mut self, hash: &ItemHash, item: u32) -> Result<(), StoreError> {
        let bucket = self.bucket_of(hash);
        if self.sizes[bucket] >= self.capacity {
            return Err(StoreError::ShardOverflow {
                bucket,
                capacity: self.capacity,
            });
        }

        if self.offsets[bucket] == EMPTY_SLOT {
            self.offsets[bucket] = self.slots.len() as u32;
            self.slots
                .resize(self.slots.len() + self.capacity as usize, EMPTY_SLOT);
        }

        let slot = self.offsets[bucket] as usize + self.sizes[bucket] as usize;
        self.slots[slot] = item;
        self.sizes[bucket] += 1;
        self.set_dirty(bucket);
        Ok(())
    }

    /// Finds the item whose identity hash is `hash`. `ids` is the identity
    /// hash column the stored indices refer to.
    ///
    /// Not a pure read: a dirty bucket is sorted in place first.
    pub fn lookup(&mut self, hash: &ItemHash, ids: &[ItemHash]) -> Option<u32> {
        let bucket = self.bucket_of(hash);
        if self.offsets[bucket] == EMPTY_SLOT {
            return None;
        }
        if self.is_dirty(bucket) {
            self.sort_bucket(bucket, ids);
        }

        let entries = self.entries(bucket);
        entries
            .binary_search_by(|&item| ids[item as usize].cmp(hash))
            .ok()
            .map(|pos| entries[pos])
    }

    /// Sorts every dirty bucket, leaving the index clean.
    pub fn finalize(&mut self, ids: &[ItemHash]) {
        for bucket in 0..self.offsets.len() {
            if self.is_dirty(bucket) {
                self.sort_bucket(bucket, ids);
            }
        }
    }

    pub fn buckets_in_use(&self) -> usize {
        self.sizes.iter().filter(|&&size| size > 0).count()
    }

    pub fn fullest_bucket(&self) -> u32 {
        self.sizes.iter().copied().max().unwrap_or(0)
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    pub fn dirty_words(&self) -> &[u32] {
        &self.dirty
    }

    pub fn slots(&self) -> &[u32] {
        &self.slots
    }

    pub fn is_dirty(&self, bucket: usize) -> bool {
        self.dirty[bucket / 32] & (1 << (bucket % 32)) != 0
    }

    fn set_dirty(&mut self, bucket: usize) {
        self.dirty[bucket / 32] |= 1 << (bucket % 32);
    }

    fn clear_dirty(&mut self, bucket: usize) {
        self.dirty[bucket / 32] &= !(1 << (bucket % 32));
    }

    fn entries(&self, bucket: usize) -> &[u32] {
        let start = self.offsets[bucket] as usize;
        &self.slots[start..start + self.sizes[bucket] as usize]
    }

    fn sort_bucket(&mut self, bucket: usize, ids: &[ItemHash]) {
        let offset = self.offsets[bucket];
        if offset != EMPTY_SLOT && self.sizes[bucket] > 1 {
            let start = offset as usize;
            let end = start + self.sizes[bucket] as usize;
            self.slots[start..end]
                .sort_unstable_by(|&a, &b| ids[a as usize].cmp(&ids[b as usize]));
        }
        self.clear_dirty(bucket);
    }
}

fn bitset_words(buckets: usize) -> usize {
    buckets.div_ceil(32)
}
