use serde::Deserialize;

use crate::error::StoreError;

pub const DEFAULT_SHARD_BITS: u32 = 12;
pub const DEFAULT_SHARD_CAPACITY: u32 = 128;
/// Largest accepted bucket size. A bucket's slots are allocated in one piece
/// on its first insert.
pub const MAX_SHARD_CAPACITY: u32 = 1 << 16;

/// Shard index shape used for newly created (empty) generations.
///
/// A loaded database keeps the shape recorded in its header, and generations
/// created with [`Generation::new_generation`](crate::Generation::new_generation)
/// inherit it. The index holds at most `2^shard_bits * shard_capacity` items,
/// and far fewer in practice since a single full bucket rejects further inserts
/// into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Number of hash-prefix bits selecting a bucket (`N`, 1..=16).
    pub shard_bits: u32,
    /// Entries per bucket (`S`, 1..=[`MAX_SHARD_CAPACITY`]).
    pub shard_capacity: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shard_bits: DEFAULT_SHARD_BITS,
            shard_capacity: DEFAULT_SHARD_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by `DEPTRACKR_SHARD_BITS` / `DEPTRACKR_SHARD_CAPACITY`.
    ///
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(bits) = env_u32("DEPTRACKR_SHARD_BITS") {
            config.shard_bits = bits;
        }
        if let Some(capacity) = env_u32("DEPTRACKR_SHARD_CAPACITY") {
            config.shard_capacity = capacity;
        }
        config
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if !(1..=16).contains(&self.shard_bits) {
            return Err(StoreError::InvalidConfig {
                message: format!("shard_bits must be in 1..=16, got {}", self.shard_bits),
            });
        }
        if !(1..=MAX_SHARD_CAPACITY).contains(&self.shard_capacity) {
            return Err(StoreError::InvalidConfig {
                message: format!(
                    "shard_capacity must be in 1..={MAX_SHARD_CAPACITY}, got {}",
                    self.shard_capacity
                ),
            });
        }
        Ok(())
    }
}

fn env_u32(name: &str) -> Option<u32> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u32>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(
                target: "deptrackr",
                var = name,
                value = %raw,
                error = %err,
                "ignoring unparsable environment override"
            );
            None
        }
    }
}
