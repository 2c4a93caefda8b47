pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors produced by the dependency store.
///
/// Only `save` surfaces these to callers; `load` logs them and degrades to an
/// empty generation, and the in-memory operations report outcomes as return
/// values.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] deptrackr_storage::StorageError),

    #[error("generation is read-only")]
    ReadOnly,

    #[error("corrupt database: {reason}")]
    Corrupt { reason: String },

    #[error("shard {bucket} is full ({capacity} entries)")]
    ShardOverflow { bucket: usize, capacity: u32 },

    #[error("{what} would exceed the format limit of {limit} entries")]
    CapacityExceeded { what: &'static str, limit: usize },

    #[error("invalid store config: {message}")]
    InvalidConfig { message: String },
}

impl StoreError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt {
            reason: reason.into(),
        }
    }
}
