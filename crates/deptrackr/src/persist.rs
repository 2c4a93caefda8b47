use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use deptrackr_storage::{
    signature_for, sync_dir_best_effort, write_file_atomic, DbFile, DbHeader, DbReader, DbWriter,
    StorageError, SIGNATURE_LEN,
};

use crate::arena::BlobArena;
use crate::config::StoreConfig;
use crate::deps::DependencyList;
use crate::error::StoreError;
use crate::generation::{Access, Capacity, Generation};
use crate::hash::{ItemHash, HASH_LEN};
use crate::items::ItemStore;
use crate::lock::DbLock;
use crate::shard::{ShardIndex, ShardParts};
use crate::state::ItemState;

/// Bump when the on-disk layout changes; older files then fail the signature
/// check and are discarded on load.
pub const SCHEMA_VERSION: u32 = 1;

pub const MAIN_DB_FILE: &str = "deptrackr.main.db";
pub const POINT_DB_FILE: &str = "deptrackr.point.db";
pub const LOCK_FILE: &str = "deptrackr.lock";

const SECTION_ID_HASHES: &str = "id_hashes";
const SECTION_CHANGE_HASHES: &str = "change_hashes";
const SECTION_ID_FLAGS: &str = "id_flags";
const SECTION_CHANGE_FLAGS: &str = "change_flags";
const SECTION_DEPS_START: &str = "deps_start";
const SECTION_DEPS_COUNT: &str = "deps_count";
const SECTION_ID_OFFSET: &str = "id_data_offset";
const SECTION_ID_SIZE: &str = "id_data_size";
const SECTION_CHANGE_OFFSET: &str = "change_data_offset";
const SECTION_CHANGE_SIZE: &str = "change_data_size";
const SECTION_DEPENDENCIES: &str = "dependencies";
const SECTION_DATA: &str = "data";
const SECTION_SHARD_OFFSETS: &str = "shard_offsets";
const SECTION_SHARD_SIZES: &str = "shard_sizes";
const SECTION_SHARD_DIRTY: &str = "shard_dirty";
const SECTION_SHARD_ITEMS: &str = "shard_items";

/// The committed generation read by `load`.
pub fn main_db_path(dir: &Path) -> PathBuf {
    dir.join(MAIN_DB_FILE)
}

/// The pending generation written by `save` and promoted by the next `load`.
pub fn point_db_path(dir: &Path) -> PathBuf {
    dir.join(POINT_DB_FILE)
}

pub fn lock_path(dir: &Path) -> PathBuf {
    dir.join(LOCK_FILE)
}

pub fn db_signature() -> [u8; SIGNATURE_LEN] {
    signature_for(&format!("deptrackr-db/v{SCHEMA_VERSION}"))
}

impl Generation {
    /// [`Generation::load_with_config`] with the default [`StoreConfig`].
    pub fn load(dir: &Path) -> Generation {
        Self::load_with_config(dir, &StoreConfig::default())
    }

    /// Loads the committed generation from `dir`, first promoting a pending
    /// generation left by a previous `save`.
    ///
    /// Never fails: a missing, truncated, mismatched or otherwise unreadable
    /// database is logged and replaced by an empty writable generation shaped
    /// by `config`. A successfully loaded generation is read-only, has every
    /// shard bucket sorted and starts a fresh query session.
    pub fn load_with_config(dir: &Path, config: &StoreConfig) -> Generation {
        let config = match config.validate() {
            Ok(()) => *config,
            Err(err) => {
                emit_load_diagnostic(dir, format_args!("ignoring store config: {err}"));
                StoreConfig::default()
            }
        };

        match try_load(dir) {
            Ok(Some(generation)) => {
                let stats = generation.stats();
                tracing::debug!(
                    target: "deptrackr",
                    path = %dir.display(),
                    items = stats.items,
                    dependencies = stats.dependencies,
                    data_bytes = stats.data_bytes,
                    buckets_in_use = stats.buckets_in_use,
                    fullest_bucket = stats.fullest_bucket,
                    "loaded dependency database"
                );
                generation
            }
            Ok(None) => {
                tracing::debug!(
                    target: "deptrackr",
                    path = %dir.display(),
                    "no dependency database; starting empty"
                );
                empty_writable(config)
            }
            Err(err) => {
                emit_load_diagnostic(
                    dir,
                    format_args!("discarding unreadable dependency database: {err}"),
                );
                empty_writable(config)
            }
        }
    }

    /// Writes this generation to `<dir>/deptrackr.point.db`.
    ///
    /// The committed database is left untouched; the next `load` promotes the
    /// point file. Read-only generations cannot be saved.
    pub fn save(&self, dir: &Path) -> Result<(), StoreError> {
        if self.is_read_only() {
            return Err(StoreError::ReadOnly);
        }

        fs::create_dir_all(dir)?;
        let _lock = DbLock::exclusive(dir)?;

        let header = DbHeader {
            signature: db_signature(),
            item_count: self.len() as u32,
            shard_bits: self.shards.bits(),
            shard_capacity: self.shards.capacity(),
            hash_len: HASH_LEN as u32,
        };
        let path = point_db_path(dir);
        let mut bytes = 0;
        write_file_atomic(&path, |out| {
            bytes = self.write_sections(out, &header)?;
            Ok(())
        })?;

        let stats = self.stats();
        tracing::debug!(
            target: "deptrackr",
            path = %path.display(),
            bytes,
            items = stats.items,
            dependencies = stats.dependencies,
            data_bytes = stats.data_bytes,
            buckets_in_use = stats.buckets_in_use,
            fullest_bucket = stats.fullest_bucket,
            "saved dependency database"
        );
        Ok(())
    }

    /// Returns the number of bytes written.
    fn write_sections<W: Write>(&self, out: W, header: &DbHeader) -> Result<u64, StorageError> {
        let items = &self.items;
        let mut writer = DbWriter::new(out, header)?;
        writer.write_raw(SECTION_ID_HASHES, HASH_LEN, &hash_bytes(&items.id_hashes))?;
        writer.write_raw(SECTION_CHANGE_HASHES, HASH_LEN, &hash_bytes(&items.change_hashes))?;
        writer.write_u32s(SECTION_ID_FLAGS, &items.id_flags)?;
        writer.write_u32s(SECTION_CHANGE_FLAGS, &items.change_flags)?;
        writer.write_u32s(SECTION_DEPS_START, &items.deps_start)?;
        writer.write_u32s(SECTION_DEPS_COUNT, &items.deps_count)?;
        writer.write_u32s(SECTION_ID_OFFSET, &items.id_offset)?;
        writer.write_u32s(SECTION_ID_SIZE, &items.id_size)?;
        writer.write_u32s(SECTION_CHANGE_OFFSET, &items.change_offset)?;
        writer.write_u32s(SECTION_CHANGE_SIZE, &items.change_size)?;
        writer.write_u32s(SECTION_DEPENDENCIES, self.deps.as_slice())?;
        writer.write_raw(SECTION_DATA, 1, self.arena.as_bytes())?;
        writer.write_u32s(SECTION_SHARD_OFFSETS, self.shards.offsets())?;
        writer.write_u32s(SECTION_SHARD_SIZES, self.shards.sizes())?;
        writer.write_u32s(SECTION_SHARD_DIRTY, self.shards.dirty_words())?;
        writer.write_u32s(SECTION_SHARD_ITEMS, self.shards.slots())?;
        let bytes = writer.bytes_written();
        writer.finish()?;
        Ok(bytes)
    }
}

fn empty_writable(config: StoreConfig) -> Generation {
    Generation::with_capacity(
        Access::Writable,
        config.shard_bits,
        config.shard_capacity,
        Capacity::default(),
    )
}

fn try_load(dir: &Path) -> Result<Option<Generation>, StoreError> {
    if !dir.is_dir() {
        return Ok(None);
    }

    // Promotion needs the exclusive lock. A plain read of main can go ahead
    // without one when the lockfile is unusable, e.g. in a read-only cache.
    let _lock = if point_db_path(dir).try_exists()? {
        let lock = DbLock::exclusive(dir)?;
        swap_pending_generation(dir)?;
        Some(lock)
    } else {
        match DbLock::shared(dir) {
            Ok(lock) => Some(lock),
            Err(err) => {
                emit_load_diagnostic(
                    dir,
                    format_args!("reading dependency database without a lock: {err}"),
                );
                None
            }
        }
    };

    let path = main_db_path(dir);
    let file = match DbFile::open(&path) {
        Ok(file) => file,
        Err(StorageError::Io(err)) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let mut generation = decode(file.bytes())?;
    generation.finalize();
    Ok(Some(generation))
}

/// Promotes `deptrackr.point.db` to `deptrackr.main.db` if a save left one.
fn swap_pending_generation(dir: &Path) -> Result<(), StoreError> {
    let point = point_db_path(dir);
    if !point.try_exists()? {
        return Ok(());
    }

    let main = main_db_path(dir);
    match fs::remove_file(&main) {
        Ok(()) => {
            tracing::debug!(
                target: "deptrackr",
                path = %main.display(),
                "removed superseded database"
            );
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    fs::rename(&point, &main)?;
    sync_dir_best_effort(dir);
    tracing::debug!(
        target: "deptrackr",
        from = %point.display(),
        to = %main.display(),
        "promoted pending database"
    );
    Ok(())
}

/// Decodes and validates a database image into a read-only generation.
fn decode(bytes: &[u8]) -> Result<Generation, StoreError> {
    let mut reader = DbReader::new(bytes, &db_signature())?;
    let header = *reader.header();
    if header.hash_len as usize != HASH_LEN {
        return Err(StoreError::corrupt(format!(
            "identity hash width {} (expected {HASH_LEN})",
            header.hash_len
        )));
    }
    let n = header.item_count as usize;

    let items = ItemStore {
        id_hashes: read_hashes(&mut reader, SECTION_ID_HASHES)?,
        change_hashes: read_hashes(&mut reader, SECTION_CHANGE_HASHES)?,
        id_flags: reader.read_u32s(SECTION_ID_FLAGS)?,
        change_flags: reader.read_u32s(SECTION_CHANGE_FLAGS)?,
        deps_start: reader.read_u32s(SECTION_DEPS_START)?,
        deps_count: reader.read_u32s(SECTION_DEPS_COUNT)?,
        id_offset: reader.read_u32s(SECTION_ID_OFFSET)?,
        id_size: reader.read_u32s(SECTION_ID_SIZE)?,
        change_offset: reader.read_u32s(SECTION_CHANGE_OFFSET)?,
        change_size: reader.read_u32s(SECTION_CHANGE_SIZE)?,
    };
    if items.len() != n || !items.is_consistent() {
        return Err(StoreError::corrupt(format!(
            "item columns do not match the header count {n}"
        )));
    }

    let deps = DependencyList::from_indices(reader.read_u32s(SECTION_DEPENDENCIES)?);
    let arena = BlobArena::from_bytes(reader.read_raw(SECTION_DATA, 1)?.to_vec());

    for index in 0..n {
        let row = items.row(index as u32);
        if !deps.contains(row.deps) {
            return Err(StoreError::corrupt(format!(
                "item {index} dependency range {:?} exceeds the list of {}",
                row.deps,
                deps.len()
            )));
        }
        if !arena.contains(row.id_data) || !arena.contains(row.change_data) {
            return Err(StoreError::corrupt(format!(
                "item {index} payload lies outside the {}-byte arena",
                arena.len()
            )));
        }
    }
    if let Some(&bad) = deps.as_slice().iter().find(|&&dep| dep as usize >= n) {
        return Err(StoreError::corrupt(format!(
            "dependency entry {bad} references a missing item"
        )));
    }

    let shards = ShardIndex::from_parts(
        ShardParts {
            bits: header.shard_bits,
            capacity: header.shard_capacity,
            offsets: reader.read_u32s(SECTION_SHARD_OFFSETS)?,
            sizes: reader.read_u32s(SECTION_SHARD_SIZES)?,
            dirty: reader.read_u32s(SECTION_SHARD_DIRTY)?,
            slots: reader.read_u32s(SECTION_SHARD_ITEMS)?,
        },
        &items.id_hashes,
    )?;
    reader.finish()?;

    Ok(Generation {
        access: Access::ReadOnly,
        items,
        shards,
        deps,
        arena,
        states: vec![ItemState::Unverified; n],
    })
}

fn read_hashes(reader: &mut DbReader<'_>, name: &str) -> Result<Vec<ItemHash>, StorageError> {
    let payload = reader.read_raw(name, HASH_LEN)?;
    Ok(payload
        .chunks_exact(HASH_LEN)
        .map(|chunk| {
            let mut bytes = [0u8; HASH_LEN];
            bytes.copy_from_slice(chunk);
            ItemHash::new(bytes)
        })
        .collect())
}

fn hash_bytes(hashes: &[ItemHash]) -> Vec<u8> {
    let mut out = Vec::with_capacity(hashes.len() * HASH_LEN);
    for hash in hashes {
        out.extend_from_slice(hash.as_bytes());
    }
    out
}

fn emit_load_diagnostic(dir: &Path, message: std::fmt::Arguments<'_>) {
    tracing::warn!(
        target: "deptrackr",
        path = %dir.display(),
        "{message}"
    );
}
