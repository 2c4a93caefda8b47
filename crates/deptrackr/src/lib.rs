//! Dependency-tracking database for incremental builds.
//!
//! A [`Generation`] records, for every build item, an identity hash, a change
//! hash, flags, opaque payloads and the set of items it depends on. A build
//! loads the previous generation, asks [`Generation::query_item`] whether each
//! item is still up to date, carries unchanged items over with
//! [`Generation::copy_item`], records rebuilt ones with
//! [`Generation::add_item`] and saves the result for the next run:
//!
//! ```no_run
//! use std::path::Path;
//! use deptrackr::{Generation, ItemState};
//!
//! let dir = Path::new("build/.deptrackr");
//! let mut old = Generation::load(dir);
//! let mut new = old.new_generation();
//! let known: Vec<_> = old.hashes().collect();
//! for hash in known {
//!     if old.query_item(&hash, false, |_, _| ItemState::UpToDate) == ItemState::UpToDate {
//!         old.copy_item(&mut new, &hash);
//!     }
//! }
//! new.save(dir)?;
//! # Ok::<(), deptrackr::StoreError>(())
//! ```
//!
//! ## On-disk layout
//!
//! `<dir>/` holds:
//! - `deptrackr.main.db`: the committed generation read by `load`
//! - `deptrackr.point.db`: a generation written by `save`, promoted to
//!   `deptrackr.main.db` by the next `load`
//! - `deptrackr.lock`: lockfile taken exclusively by save and promotion, and
//!   shared by plain loads
//!
//! Both database files use the `deptrackr-storage` section format: a header
//! (signature, item count, shard shape, hash width) followed by sixteen
//! sections holding the item columns, the dependency list, the payload arena
//! and the shard index.

mod arena;
mod config;
mod deps;
mod error;
mod generation;
mod hash;
mod items;
mod lock;
mod persist;
mod shard;
mod state;

pub use config::{
    StoreConfig, DEFAULT_SHARD_BITS, DEFAULT_SHARD_CAPACITY, MAX_SHARD_CAPACITY,
};
pub use error::{Result, StoreError};
pub use generation::{Access, Generation, GenerationStats, Item, ItemView, MAX_ENTRIES};
pub use hash::{compare, ItemHash, HASH_LEN};
pub use lock::{DbLock, LockMode};
pub use persist::{
    db_signature, lock_path, main_db_path, point_db_path, LOCK_FILE, MAIN_DB_FILE,
    POINT_DB_FILE, SCHEMA_VERSION,
};
pub use state::ItemState;
