use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use fs2::FileExt as _;

use crate::error::Result;
use crate::persist::lock_path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    /// Readers of `deptrackr.main.db`; any number may hold it at once.
    Shared,
    /// Writers of the point file and the point→main promotion.
    Exclusive,
}

/// Advisory lock on `<dir>/deptrackr.lock`.
///
/// `save` and the promotion step of `load` take it exclusively. Plain loads
/// take it shared so they never observe a half-finished promotion. Released
/// on drop.
#[derive(Debug)]
pub struct DbLock {
    file: File,
    mode: LockMode,
    _local: LocalGuard,
}

/// Orders threads of this process before they reach the file lock, which some
/// platforms only enforce between processes.
#[derive(Debug)]
enum LocalGuard {
    Shared(#[allow(dead_code)] RwLockReadGuard<'static, ()>),
    Exclusive(#[allow(dead_code)] RwLockWriteGuard<'static, ()>),
}

impl DbLock {
    /// Blocks until `dir` is locked exclusively. `dir` must exist.
    pub fn exclusive(dir: &Path) -> Result<Self> {
        Self::acquire(dir, LockMode::Exclusive)
    }

    /// Blocks until `dir` is locked for reading. `dir` must exist.
    pub fn shared(dir: &Path) -> Result<Self> {
        Self::acquire(dir, LockMode::Shared)
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    fn acquire(dir: &Path, mode: LockMode) -> Result<Self> {
        let local = local_lock(dir);
        let local = match mode {
            LockMode::Shared => LocalGuard::Shared(
                local
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            ),
            LockMode::Exclusive => LocalGuard::Exclusive(
                local
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            ),
        };

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path(dir))?;
        match mode {
            LockMode::Shared => file.lock_shared()?,
            LockMode::Exclusive => file.lock_exclusive()?,
        }

        Ok(Self {
            file,
            mode,
            _local: local,
        })
    }
}

impl Drop for DbLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::debug!(target: "deptrackr", error = %err, "failed to release database lock");
        }
    }
}

/// One `RwLock` per database directory, kept for the life of the process.
fn local_lock(dir: &Path) -> &'static RwLock<()> {
    static DIRS: OnceLock<Mutex<HashMap<PathBuf, &'static RwLock<()>>>> = OnceLock::new();

    let mut dirs = DIRS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *dirs
        .entry(dir.to_path_buf())
        .or_insert_with(|| &*Box::leak(Box::new(RwLock::new(()))))
}
