//! On-disk primitives for the deptrackr dependency database.
//!
//! ## Format
//! A database file is:
//! - a fixed-size header (32 bytes, little-endian, see [`DbHeader`])
//! - a sequence of self-describing sections
//!
//! Each section starts with a 32-byte [`SectionHeader`]:
//!
//! ```text
//! [10 bytes: SHA-1(name)[0..10]] [i32 count] [i32 element size] [i32 total bytes]
//! [10 bytes: SHA-1(name)[10..20]] [total bytes of payload]
//! ```
//!
//! Sections carry no offsets; readers consume them strictly in the order they
//! were written and reject any name or shape mismatch. Every integer is
//! little-endian so files are portable across hosts.
//!
//! Files are written to a temp file and renamed into place
//! ([`write_file_atomic`]); readers map them read-only ([`DbFile`]).

mod error;
mod header;
mod read;
mod section;
mod write;

pub use error::StorageError;
pub use header::{signature_for, DbHeader, HEADER_LEN, SIGNATURE_LEN};
pub use read::{DbFile, DbReader};
pub use section::{section_name_hash, SectionHeader, SECTION_HEADER_LEN};
pub use write::{sync_dir_best_effort, write_file_atomic, DbWriter};
