use std::ops::Range;

/// Location of a payload inside a [`BlobArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Span {
    pub offset: u32,
    pub len: u32,
}

impl Span {
    pub fn range(self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.len as usize
    }
}

/// Append-only byte buffer holding every item's variable-length payloads.
///
/// Space is never reclaimed; a generation's arena only grows until the
/// generation is dropped.
#[derive(Debug, Default)]
pub(crate) struct BlobArena {
    bytes: Vec<u8>,
}

impl BlobArena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Callers keep the arena below `u32::MAX` bytes (see `Generation::ensure_room`).
    pub fn append(&mut self, data: &[u8]) -> Span {
        let span = Span {
            offset: self.bytes.len() as u32,
            len: data.len() as u32,
        };
        self.bytes.extend_from_slice(data);
        span
    }

    pub fn get(&self, span: Span) -> &[u8] {
        &self.bytes[span.range()]
    }

    pub fn contains(&self, span: Span) -> bool {
        (span.offset as u64 + span.len as u64) <= self.bytes.len() as u64
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
