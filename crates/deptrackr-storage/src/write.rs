use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::StorageError;
use crate::header::DbHeader;
use crate::section::SectionHeader;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Streams a database header followed by sections to `out`.
///
/// Sections are written in call order; readers must request them in the same
/// order.
pub struct DbWriter<W: Write> {
    out: W,
    bytes_written: u64,
}

impl<W: Write> DbWriter<W> {
    pub fn new(mut out: W, header: &DbHeader) -> Result<Self, StorageError> {
        let encoded = header.encode()?;
        out.write_all(&encoded)?;
        Ok(Self {
            out,
            bytes_written: encoded.len() as u64,
        })
    }

    /// Writes a section of little-endian `u32` elements.
    pub fn write_u32s(&mut self, name: &str, values: &[u32]) -> Result<(), StorageError> {
        let encoded = SectionHeader::new(name, values.len(), 4)?.encode();
        self.out.write_all(&encoded)?;
        for &value in values {
            self.out.write_u32::<LittleEndian>(value)?;
        }
        self.bytes_written += (encoded.len() + values.len() * 4) as u64;
        Ok(())
    }

    /// Writes a section of fixed-size opaque elements stored back to back.
    pub fn write_raw(
        &mut self,
        name: &str,
        element_size: usize,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        if element_size == 0 || bytes.len() % element_size != 0 {
            return Err(StorageError::InvalidHeader(
                "section payload is not a whole number of elements",
            ));
        }
        let header = SectionHeader::new(name, bytes.len() / element_size, element_size)?;
        let encoded = header.encode();
        self.out.write_all(&encoded)?;
        self.out.write_all(bytes)?;
        self.bytes_written += (encoded.len() + bytes.len()) as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn finish(mut self) -> Result<W, StorageError> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Writes `path` by streaming into a unique temp file in the same directory,
/// syncing it, and renaming it over `path`.
///
/// On failure the temp file is removed and `path` is left untouched.
pub fn write_file_atomic(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<fs::File>) -> Result<(), StorageError>,
) -> Result<(), StorageError> {
    let Some(parent) = path.parent() else {
        return Err(io::Error::other("path has no parent").into());
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    fs::create_dir_all(parent)?;

    let (tmp_path, file) = open_unique_tmp_file(path, parent)?;

    let result = (|| -> Result<(), StorageError> {
        let mut out = BufWriter::new(file);
        write(&mut out)?;
        let file = out.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;
        drop(file);
        rename_overwrite(&tmp_path, path)?;
        Ok(())
    })();

    if let Err(err) = result {
        if let Err(remove_err) = fs::remove_file(&tmp_path) {
            if remove_err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target: "deptrackr.storage",
                    path = %tmp_path.display(),
                    error = %remove_err,
                    "failed to remove temporary file after write failure"
                );
            }
        }
        return Err(err);
    }

    sync_dir_best_effort(parent);
    Ok(())
}

/// Fsyncs a directory so renames inside it survive a crash. Failures are
/// logged once and otherwise ignored.
pub fn sync_dir_best_effort(dir: &Path) {
    #[cfg(unix)]
    {
        static SYNC_DIR_ERROR_LOGGED: std::sync::OnceLock<()> = std::sync::OnceLock::new();
        match fs::File::open(dir).and_then(|dir| dir.sync_all()) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                if SYNC_DIR_ERROR_LOGGED.set(()).is_ok() {
                    tracing::debug!(
                        target: "deptrackr.storage",
                        dir = %dir.display(),
                        error = %err,
                        "failed to sync directory (best effort)"
                    );
                }
            }
        }
    }

    #[cfg(not(unix))]
    let _ = dir;
}

fn rename_overwrite(tmp_path: &Path, dest: &Path) -> io::Result<()> {
    const MAX_RENAME_ATTEMPTS: usize = 1024;
    let mut attempts = 0usize;

    loop {
        match fs::rename(tmp_path, dest) {
            Ok(()) => return Ok(()),
            Err(err)
                if cfg!(windows)
                    && (err.kind() == io::ErrorKind::AlreadyExists || dest.exists()) =>
            {
                // On Windows, `rename` doesn't overwrite.
                match fs::remove_file(dest) {
                    Ok(()) => {}
                    Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
                    Err(remove_err) => return Err(remove_err),
                }

                attempts += 1;
                if attempts >= MAX_RENAME_ATTEMPTS {
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}
