use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    #[error("database signature mismatch")]
    SignatureMismatch,
    #[error("truncated file: expected at least {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("section name mismatch: expected `{expected}`")]
    SectionNameMismatch { expected: String },
    #[error(
        "section `{name}` has unexpected shape: {element_count} x {element_size} bytes, total {total_bytes}"
    )]
    SectionShape {
        name: String,
        element_count: i32,
        element_size: i32,
        total_bytes: i32,
    },
    #[error("{what} of {len} does not fit into a 32-bit field")]
    TooLarge { what: &'static str, len: usize },
}
