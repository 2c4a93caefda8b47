use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::arena::BlobArena;
use crate::config::StoreConfig;
use crate::deps::DependencyList;
use crate::error::{Result, StoreError};
use crate::hash::ItemHash;
use crate::items::{ItemStore, Row};
use crate::shard::ShardIndex;
use crate::state::ItemState;

/// Largest number of items, dependency entries or arena bytes a generation
/// may hold; the on-disk sections store counts as `i32`.
pub const MAX_ENTRIES: usize = i32::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Loaded from disk; only queried and copied from.
    ReadOnly,
    /// Being built; accepts `add_item` / `copy_item` and can be saved.
    Writable,
}

/// Caller-side description of an item, also handed to verify callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item<'a> {
    pub id_hash: ItemHash,
    pub change_hash: ItemHash,
    pub id_flags: u32,
    pub change_flags: u32,
    pub id_data: &'a [u8],
    pub change_data: &'a [u8],
}

impl<'a> Item<'a> {
    pub fn new(id_hash: ItemHash, change_hash: ItemHash) -> Self {
        Self {
            id_hash,
            change_hash,
            id_flags: 0,
            change_flags: 0,
            id_data: &[],
            change_data: &[],
        }
    }

    pub fn with_id_data(mut self, id_data: &'a [u8]) -> Self {
        self.id_data = id_data;
        self
    }

    pub fn with_change_data(mut self, change_data: &'a [u8]) -> Self {
        self.change_data = change_data;
        self
    }

    pub fn with_flags(mut self, id_flags: u32, change_flags: u32) -> Self {
        self.id_flags = id_flags;
        self.change_flags = change_flags;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerationStats {
    pub items: usize,
    pub dependencies: usize,
    pub data_bytes: usize,
    pub buckets_in_use: usize,
    pub fullest_bucket: u32,
}

/// One self-contained snapshot of the dependency database.
///
/// A generation exclusively owns its item columns, shard index, dependency
/// list and payload arena. Loaded generations are read-only; a new state is
/// built in a fresh writable generation from [`Generation::new_generation`]
/// and saved, never by mutating the loaded one.
///
/// Identity-hash lookups take `&mut self` because they may sort a dirty
/// bucket. `load` sorts every bucket up front, so a loaded generation's index
/// is not mutated again; sharing one across threads still needs a lock.
pub struct Generation {
    pub(crate) access: Access,
    pub(crate) items: ItemStore,
    pub(crate) shards: ShardIndex,
    pub(crate) deps: DependencyList,
    pub(crate) arena: BlobArena,
    pub(crate) states: Vec<ItemState>,
}

#[derive(Debug, Clone, Copy)]
enum DepSlot {
    Existing(u32),
    /// Position in the list of rows about to be appended.
    Pending(usize),
}

impl Generation {
    /// Creates an empty writable generation shaped by `config`.
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_capacity(
            Access::Writable,
            config.shard_bits,
            config.shard_capacity,
            Capacity::default(),
        ))
    }

    pub(crate) fn with_capacity(
        access: Access,
        shard_bits: u32,
        shard_capacity: u32,
        capacity: Capacity,
    ) -> Self {
        Self {
            access,
            items: ItemStore::with_capacity(capacity.items),
            shards: ShardIndex::new(shard_bits, shard_capacity, capacity.buckets),
            deps: DependencyList::with_capacity(capacity.deps),
            arena: BlobArena::with_capacity(capacity.data),
            states: Vec::with_capacity(capacity.items),
        }
    }

    /// Allocates an empty writable generation with the same shard shape,
    /// pre-sized at this generation's counts plus ~10% headroom.
    ///
    /// Never shares storage with `self`.
    pub fn new_generation(&self) -> Generation {
        Self::with_capacity(
            Access::Writable,
            self.shards.bits(),
            self.shards.capacity(),
            Capacity {
                items: headroom(self.items.len()),
                deps: headroom(self.deps.len()),
                data: headroom(self.arena.len()),
                buckets: headroom(self.shards.buckets_in_use()),
            },
        )
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn is_read_only(&self) -> bool {
        self.access == Access::ReadOnly
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.len() == 0
    }

    pub fn shard_bits(&self) -> u32 {
        self.shards.bits()
    }

    pub fn shard_capacity(&self) -> u32 {
        self.shards.capacity()
    }

    pub fn stats(&self) -> GenerationStats {
        GenerationStats {
            items: self.items.len(),
            dependencies: self.deps.len(),
            data_bytes: self.arena.len(),
            buckets_in_use: self.shards.buckets_in_use(),
            fullest_bucket: self.shards.fullest_bucket(),
        }
    }

    /// Identity hashes of every item, in index (insertion) order.
    pub fn hashes(&self) -> impl Iterator<Item = ItemHash> + '_ {
        self.items.id_hashes.iter().copied()
    }

    pub fn contains(&mut self, hash: &ItemHash) -> bool {
        self.lookup(hash).is_some()
    }

    pub fn get(&mut self, hash: &ItemHash) -> Option<ItemView<'_>> {
        let index = self.lookup(hash)?;
        Some(ItemView {
            generation: self,
            index,
        })
    }

    /// Sorts every dirty shard bucket so later lookups never mutate the index.
    pub fn finalize(&mut self) {
        self.shards.finalize(&self.items.id_hashes);
    }

    /// Memoized verification state of `hash` in the current query session.
    pub fn state_of(&mut self, hash: &ItemHash) -> ItemState {
        match self.lookup(hash) {
            Some(index) => self.states[index as usize],
            None => ItemState::Unverified,
        }
    }

    /// Starts a new query session by forgetting every memoized state.
    pub fn reset_query_state(&mut self) {
        self.states.fill(ItemState::Unverified);
    }

    /// Adds `item` with its (already flattened) dependencies.
    ///
    /// Returns `false` without modifying the generation when the item's
    /// identity hash is already present, when the generation is read-only, or
    /// when a shard bucket or format limit would overflow. Dependencies that
    /// already exist are referenced by their existing row; missing ones are
    /// appended as rows without dependencies of their own.
    pub fn add_item(&mut self, item: &Item<'_>, deps: &[Item<'_>]) -> bool {
        if self.access == Access::ReadOnly {
            tracing::warn!(
                target: "deptrackr",
                item = %item.id_hash,
                "add_item called on a read-only generation"
            );
            return false;
        }
        if self.lookup(&item.id_hash).is_some() {
            tracing::debug!(
                target: "deptrackr",
                item = %item.id_hash,
                "add_item rejected duplicate identity hash"
            );
            return false;
        }

        let mut new_rows: Vec<Item<'_>> = vec![*item];
        let mut pending: HashMap<ItemHash, usize> = HashMap::from([(item.id_hash, 0)]);
        let mut slots = Vec::with_capacity(deps.len());
        for dep in deps {
            let slot = if let Some(&pos) = pending.get(&dep.id_hash) {
                DepSlot::Pending(pos)
            } else if let Some(index) = self.lookup(&dep.id_hash) {
                DepSlot::Existing(index)
            } else {
                new_rows.push(*dep);
                pending.insert(dep.id_hash, new_rows.len() - 1);
                DepSlot::Pending(new_rows.len() - 1)
            };
            slots.push(slot);
        }

        let needed: Vec<(ItemHash, usize)> = new_rows
            .iter()
            .map(|row| (row.id_hash, row.id_data.len() + row.change_data.len()))
            .collect();
        let result = self
            .ensure_room(&needed, deps.len())
            .and_then(|()| self.append_rows(&new_rows, &slots));
        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    target: "deptrackr",
                    item = %item.id_hash,
                    error = %err,
                    "add_item rejected"
                );
                false
            }
        }
    }

    /// Checks whether `hash` and its recorded dependencies are still up to date.
    ///
    /// Unknown items are `OutOfDate`. Otherwise `verify` is called for the item
    /// and then for each direct dependency, unless their state is already
    /// memoized in this session. With `verify_all == false` the walk stops at
    /// the first `OutOfDate` result; with `verify_all == true` every direct
    /// dependency is visited. A callback answering `Unverified` counts as
    /// `OutOfDate`.
    pub fn query_item<F>(&mut self, hash: &ItemHash, verify_all: bool, mut verify: F) -> ItemState
    where
        F: FnMut(ItemState, &Item<'_>) -> ItemState,
    {
        let Some(index) = self.lookup(hash) else {
            return ItemState::OutOfDate;
        };

        let mut result = self.resolve_state(index, &mut verify);
        if result == ItemState::OutOfDate && !verify_all {
            return result;
        }

        let range = self.items.deps(index).range();
        for position in range {
            let dep = self.deps.as_slice()[position];
            if self.resolve_state(dep, &mut verify) == ItemState::OutOfDate {
                result = ItemState::OutOfDate;
                if !verify_all {
                    break;
                }
            }
        }
        result
    }

    /// Carries `hash` from this generation into `dst`, together with every
    /// recorded dependency `dst` does not already hold.
    ///
    /// Returns `false` (and leaves `dst` untouched) when `hash` is unknown
    /// here, `dst` is read-only, or `dst` has no room. Dependencies shared
    /// between several copied items end up as a single row in `dst`.
    pub fn copy_item(&mut self, dst: &mut Generation, hash: &ItemHash) -> bool {
        if dst.access == Access::ReadOnly {
            tracing::warn!(
                target: "deptrackr",
                item = %hash,
                "copy_item into a read-only generation"
            );
            return false;
        }
        let Some(root) = self.lookup(hash) else {
            return false;
        };
        if dst.lookup(hash).is_some() {
            return true;
        }

        let plan = self.plan_copy(root, dst);
        let needed: Vec<(ItemHash, usize)> = plan
            .iter()
            .map(|&index| {
                let row = self.items.row(index);
                (
                    row.id_hash,
                    row.id_data.len as usize + row.change_data.len as usize,
                )
            })
            .collect();
        let dep_total: usize = plan
            .iter()
            .map(|&index| self.items.deps(index).count as usize)
            .sum();

        let result = dst
            .ensure_room(&needed, dep_total)
            .and_then(|()| self.apply_copy(&plan, dst));
        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    target: "deptrackr",
                    item = %hash,
                    error = %err,
                    "copy_item rejected"
                );
                false
            }
        }
    }

    pub(crate) fn lookup(&mut self, hash: &ItemHash) -> Option<u32> {
        self.shards.lookup(hash, &self.items.id_hashes)
    }

    fn resolve_state<F>(&mut self, index: u32, verify: &mut F) -> ItemState
    where
        F: FnMut(ItemState, &Item<'_>) -> ItemState,
    {
        let current = self.states[index as usize];
        if current.is_verified() {
            return current;
        }

        let item = item_at(&self.items, &self.arena, index);
        let state = match verify(current, &item) {
            ItemState::Unverified => ItemState::OutOfDate,
            state => state,
        };
        self.states[index as usize] = state;
        state
    }

    /// Verifies that `rows` (identity hash, payload bytes) plus `dep_entries`
    /// dependency entries fit without overflowing a bucket or a format limit.
    fn ensure_room(&self, rows: &[(ItemHash, usize)], dep_entries: usize) -> Result<()> {
        let data: usize = rows.iter().map(|&(_, len)| len).sum();
        let limits = [
            ("items", self.items.len(), rows.len()),
            ("dependency entries", self.deps.len(), dep_entries),
            ("payload bytes", self.arena.len(), data),
        ];
        for (what, current, extra) in limits {
            if current.saturating_add(extra) > MAX_ENTRIES {
                return Err(StoreError::CapacityExceeded {
                    what,
                    limit: MAX_ENTRIES,
                });
            }
        }

        let mut per_bucket: HashMap<usize, u32> = HashMap::new();
        for (hash, _) in rows {
            *per_bucket.entry(self.shards.bucket_of(hash)).or_default() += 1;
        }
        for (bucket, needed) in per_bucket {
            if self.shards.remaining(bucket) < needed {
                return Err(StoreError::ShardOverflow {
                    bucket,
                    capacity: self.shards.capacity(),
                });
            }
        }
        Ok(())
    }

    fn append_rows(&mut self, rows: &[Item<'_>], slots: &[DepSlot]) -> Result<()> {
        let mut indices = Vec::with_capacity(rows.len());
        for row in rows {
            indices.push(self.push_row(row)?);
        }

        let resolved: Vec<u32> = slots
            .iter()
            .map(|slot| match *slot {
                DepSlot::Existing(index) => index,
                DepSlot::Pending(pos) => indices[pos],
            })
            .collect();
        let range = self.deps.append(&resolved);
        self.items.set_deps(indices[0], range);
        Ok(())
    }

    /// Appends one row with an empty dependency range.
    fn push_row(&mut self, item: &Item<'_>) -> Result<u32> {
        let index = self.items.len() as u32;
        self.shards.insert(&item.id_hash, index)?;

        let id_data = self.arena.append(item.id_data);
        let change_data = self.arena.append(item.change_data);
        let deps = self.deps.empty_range();
        self.items.push(Row {
            id_hash: item.id_hash,
            change_hash: item.change_hash,
            id_flags: item.id_flags,
            change_flags: item.change_flags,
            deps,
            id_data,
            change_data,
        });
        self.states.push(ItemState::Unverified);
        Ok(index)
    }

    /// Rows reachable from `root` through recorded dependencies that `dst`
    /// does not hold yet, `root` first.
    fn plan_copy(&self, root: u32, dst: &mut Generation) -> Vec<u32> {
        let mut plan = Vec::new();
        let mut seen = HashSet::from([root]);
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            plan.push(index);
            for &dep in self.deps.get(self.items.deps(index)) {
                if seen.insert(dep) && !dst.contains(&self.items.id_hashes[dep as usize]) {
                    stack.push(dep);
                }
            }
        }
        plan
    }

    fn apply_copy(&self, plan: &[u32], dst: &mut Generation) -> Result<()> {
        let mut copied = Vec::with_capacity(plan.len());
        for &index in plan {
            let item = item_at(&self.items, &self.arena, index);
            copied.push((index, dst.push_row(&item)?));
        }

        for (src_index, dst_index) in copied {
            let src_deps = self.deps.get(self.items.deps(src_index));
            let mut resolved = Vec::with_capacity(src_deps.len());
            for &dep in src_deps {
                let dep_hash = self.items.id_hashes[dep as usize];
                let Some(dst_dep) = dst.lookup(&dep_hash) else {
                    return Err(StoreError::corrupt(format!(
                        "dependency {dep_hash} missing from destination after copy"
                    )));
                };
                resolved.push(dst_dep);
            }
            let range = dst.deps.append(&resolved);
            dst.items.set_deps(dst_index, range);
        }
        Ok(())
    }
}

impl Default for Generation {
    fn default() -> Self {
        let config = StoreConfig::default();
        Self::with_capacity(
            Access::Writable,
            config.shard_bits,
            config.shard_capacity,
            Capacity::default(),
        )
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generation")
            .field("access", &self.access)
            .field("shard_bits", &self.shards.bits())
            .field("shard_capacity", &self.shards.capacity())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Read access to one stored row.
#[derive(Clone, Copy)]
pub struct ItemView<'a> {
    generation: &'a Generation,
    index: u32,
}

impl<'a> ItemView<'a> {
    /// Dense index of the row; only meaningful within this generation.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn id_hash(&self) -> ItemHash {
        self.generation.items.id_hashes[self.index as usize]
    }

    pub fn change_hash(&self) -> ItemHash {
        self.generation.items.change_hashes[self.index as usize]
    }

    pub fn id_flags(&self) -> u32 {
        self.generation.items.id_flags[self.index as usize]
    }

    pub fn change_flags(&self) -> u32 {
        self.generation.items.change_flags[self.index as usize]
    }

    pub fn id_data(&self) -> &'a [u8] {
        self.item().id_data
    }

    pub fn change_data(&self) -> &'a [u8] {
        self.item().change_data
    }

    pub fn item(&self) -> Item<'a> {
        item_at(
            &self.generation.items,
            &self.generation.arena,
            self.index,
        )
    }

    pub fn dependencies(&self) -> impl Iterator<Item = ItemView<'a>> + 'a {
        let generation = self.generation;
        generation
            .deps
            .get(generation.items.deps(self.index))
            .iter()
            .map(move |&index| ItemView { generation, index })
    }
}

impl fmt::Debug for ItemView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemView")
            .field("index", &self.index)
            .field("id_hash", &self.id_hash())
            .field("change_hash", &self.change_hash())
            .field("id_flags", &self.id_flags())
            .field("change_flags", &self.change_flags())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Capacity {
    pub items: usize,
    pub deps: usize,
    pub data: usize,
    pub buckets: usize,
}

fn headroom(count: usize) -> usize {
    count + count / 10
}

fn item_at<'a>(items: &ItemStore, arena: &'a BlobArena, index: u32) -> Item<'a> {
    let row = items.row(index);
    Item {
        id_hash: row.id_hash,
        change_hash: row.change_hash,
        id_flags: row.id_flags,
        change_flags: row.change_flags,
        id_data: arena.get(row.id_data),
        change_data: arena.get(row.change_data),
    }
}
