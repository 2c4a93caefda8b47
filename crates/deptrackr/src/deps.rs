use std::ops::Range;

/// Contiguous slice of the dependency list owned by one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct DepRange {
    pub start: u32,
    pub count: u32,
}

impl DepRange {
    pub fn range(self) -> Range<usize> {
        let start = self.start as usize;
        start..start + self.count as usize
    }
}

/// Flat list of item indices; each item addresses its dependencies as one
/// contiguous [`DepRange`].
#[derive(Debug, Default)]
pub(crate) struct DependencyList {
    indices: Vec<u32>,
}

impl DependencyList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            indices: Vec::with_capacity(capacity),
        }
    }

    pub fn from_indices(indices: Vec<u32>) -> Self {
        Self { indices }
    }

    pub fn append(&mut self, deps: &[u32]) -> DepRange {
        let range = DepRange {
            start: self.indices.len() as u32,
            count: deps.len() as u32,
        };
        self.indices.extend_from_slice(deps);
        range
    }

    /// An empty range positioned at the current end of the list.
    pub fn empty_range(&self) -> DepRange {
        DepRange {
            start: self.indices.len() as u32,
            count: 0,
        }
    }

    pub fn get(&self, range: DepRange) -> &[u32] {
        &self.indices[range.range()]
    }

    pub fn contains(&self, range: DepRange) -> bool {
        (range.start as u64 + range.count as u64) <= self.indices.len() as u64
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.indices
    }
}
