use crate::arena::Span;
use crate::deps::DepRange;
use crate::hash::ItemHash;

/// One row of the item store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Row {
    pub id_hash: ItemHash,
    pub change_hash: ItemHash,
    pub id_flags: u32,
    pub change_flags: u32,
    pub deps: DepRange,
    pub id_data: Span,
    pub change_data: Span,
}

/// Columnar per-item fields addressed by dense `u32` index.
///
/// Every column always has the same length; rows are only ever appended, so
/// an index stays valid for the lifetime of the generation.
#[derive(Debug, Default)]
pub(crate) struct ItemStore {
    pub id_hashes: Vec<ItemHash>,
    pub change_hashes: Vec<ItemHash>,
    pub id_flags: Vec<u32>,
    pub change_flags: Vec<u32>,
    pub deps_start: Vec<u32>,
    pub deps_count: Vec<u32>,
    pub id_offset: Vec<u32>,
    pub id_size: Vec<u32>,
    pub change_offset: Vec<u32>,
    pub change_size: Vec<u32>,
}

impl ItemStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id_hashes: Vec::with_capacity(capacity),
            change_hashes: Vec::with_capacity(capacity),
            id_flags: Vec::with_capacity(capacity),
            change_flags: Vec::with_capacity(capacity),
            deps_start: Vec::with_capacity(capacity),
            deps_count: Vec::with_capacity(capacity),
            id_offset: Vec::with_capacity(capacity),
            id_size: Vec::with_capacity(capacity),
            change_offset: Vec::with_capacity(capacity),
            change_size: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.id_hashes.len()
    }

    /// True when every column has the same length.
    pub fn is_consistent(&self) -> bool {
        let len = self.len();
        [
            self.change_hashes.len(),
            self.id_flags.len(),
            self.change_flags.len(),
            self.deps_start.len(),
            self.deps_count.len(),
            self.id_offset.len(),
            self.id_size.len(),
            self.change_offset.len(),
            self.change_size.len(),
        ]
        .iter()
        .all(|&column| column == len)
    }

    pub fn push(&mut self, row: Row) -> u32 {
        let index = self.len() as u32;
        self.id_hashes.push(row.id_hash);
        self.change_hashes.push(row.change_hash);
        self.id_flags.push(row.id_flags);
        self.change_flags.push(row.change_flags);
        self.deps_start.push(row.deps.start);
        self.deps_count.push(row.deps.count);
        self.id_offset.push(row.id_data.offset);
        self.id_size.push(row.id_data.len);
        self.change_offset.push(row.change_data.offset);
        self.change_size.push(row.change_data.len);
        index
    }

    pub fn row(&self, index: u32) -> Row {
        let i = index as usize;
        Row {
            id_hash: self.id_hashes[i],
            change_hash: self.change_hashes[i],
            id_flags: self.id_flags[i],
            change_flags: self.change_flags[i],
            deps: self.deps(index),
            id_data: Span {
                offset: self.id_offset[i],
                len: self.id_size[i],
            },
            change_data: Span {
                offset: self.change_offset[i],
                len: self.change_size[i],
            },
        }
    }

    pub fn deps(&self, index: u32) -> DepRange {
        let i = index as usize;
        DepRange {
            start: self.deps_start[i],
            count: self.deps_count[i],
        }
    }

    pub fn set_deps(&mut self, index: u32, deps: DepRange) {
        let i = index as usize;
        self.deps_start[i] = deps.start;
        self.deps_count[i] = deps.count;
    }
}
