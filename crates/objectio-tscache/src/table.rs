//! The timestamp table: a fixed-size, type-partitioned slab that backs
//! every timestamp entry a thread can hold. Each type (container,
//! object, dkey, akey, and the negative counterparts of the first
//! three) owns a contiguous, fixed-size range of the slab and its own
//! LRU list; a slot's type never changes across its lifetime, only the
//! key it is currently caching.
//!
//! Capacity is bounded, so keys eventually collide on a slot. Rather
//! than track that as an error, eviction folds the outgoing entry's
//! timestamps forward into a per-type "water mark" and seeds the new
//! occupant from it — a conflict check against a slot that was
//! recently evicted therefore stays conservative instead of silently
//! forgetting history.

use objectio_common::{Error, Result};

use crate::types::{DEFAULT_TABLE_BITS, Timestamp, TsHandle, TsType};

/// Fractional share of the default 2^23-slot table each type is given,
/// expressed as (positive, negative) slot counts. `AKey` has no
/// negative counterpart and absorbs whatever remains after the other
/// shares are taken.
const DEFAULT_SHARES: [(TsType, u32); 6] = [
    (TsType::Cont, 1024),
    (TsType::ContNeg, 32 * 1024),
    (TsType::Obj, 96 * 1024),
    (TsType::ObjNeg, 128 * 1024),
    (TsType::DKey, 896 * 1024),
    (TsType::DKeyNeg, 1024 * 1024),
];

/// Sizing for a [`TsTable`]. `bits` controls the total slot count
/// (`2^bits`); production code should use [`TsTableConfig::default`]
/// (2^23, matching the table's steady-state working set), tests should
/// use [`TsTableConfig::with_bits`] to keep allocations small.
#[derive(Clone, Copy, Debug)]
pub struct TsTableConfig {
    pub bits: u32,
}

impl Default for TsTableConfig {
    fn default() -> Self {
        Self {
            bits: DEFAULT_TABLE_BITS,
        }
    }
}

impl TsTableConfig {
    #[must_use]
    pub fn with_bits(bits: u32) -> Self {
        Self { bits }
    }

    fn partition_sizes(self) -> [(TsType, u32); 7] {
        let total = 1u64 << self.bits;
        let default_total: u64 = 1 << DEFAULT_TABLE_BITS;
        let mut sizes = [(TsType::Cont, 0u32); 7];
        let mut used = 0u64;
        for (i, (ty, share)) in DEFAULT_SHARES.iter().enumerate() {
            let scaled = ((u64::from(*share) * total) / default_total).max(1);
            sizes[i] = (*ty, scaled as u32);
            used += scaled;
        }
        let akey = total.saturating_sub(used).max(1);
        sizes[6] = (TsType::AKey, akey as u32);
        sizes
    }
}

#[derive(Clone, Copy)]
struct TypeInfo {
    base: u32,
    count: u32,
    lru: u32,
    mru: u32,
    cache_mask: u32,
    water_rl: Timestamp,
    water_rh: Timestamp,
    water_w: Timestamp,
}

struct Entry {
    ty: TsType,
    occupied: bool,
    generation: u32,
    parent: Option<TsHandle>,
    hash: u64,
    rl: Timestamp,
    rh: Timestamp,
    w: Timestamp,
    prev: u32,
    next: u32,
    miss_idx: Box<[Option<TsHandle>]>,
}

/// The fixed-size timestamp slab.
pub struct TsTable {
    entries: Vec<Entry>,
    types: [TypeInfo; 7],
}

impl TsTable {
    /// Allocate the table. The only failure mode is an unreasonably
    /// small configuration that would leave a type with zero slots.
    pub fn new(config: TsTableConfig) -> Result<Self> {
        if config.bits == 0 {
            return Err(Error::invalid_argument("table must have at least one slot"));
        }
        let sizes = config.partition_sizes();
        let total: u32 = sizes.iter().map(|(_, c)| c).sum();

        let mut entries = Vec::with_capacity(total as usize);
        let mut types = [TypeInfo {
            base: 0,
            count: 0,
            lru: 0,
            mru: 0,
            cache_mask: 0,
            water_rl: Timestamp::default(),
            water_rh: Timestamp::default(),
            water_w: Timestamp::default(),
        }; 7];

        let mut base = 0u32;
        for (slot, (ty, count)) in sizes.iter().enumerate() {
            let count = *count;
            let cache_mask = count.next_power_of_two() - 1;
            for i in 0..count {
                let idx = base + i;
                let prev = if i == 0 { base + count - 1 } else { idx - 1 };
                let next = if i == count - 1 { base } else { idx + 1 };
                let miss_idx = if ty.negative_child().is_some() {
                    vec![None; (cache_mask as usize) + 1].into_boxed_slice()
                } else {
                    Vec::new().into_boxed_slice()
                };
                entries.push(Entry {
                    ty: *ty,
                    occupied: false,
                    generation: 0,
                    parent: None,
                    hash: 0,
                    rl: Timestamp::default(),
                    rh: Timestamp::default(),
                    w: Timestamp::default(),
                    prev,
                    next,
                    miss_idx,
                });
            }
            types[slot] = TypeInfo {
                base,
                count,
                lru: base,
                mru: base + count - 1,
                cache_mask,
                water_rl: Timestamp::default(),
                water_rh: Timestamp::default(),
                water_w: Timestamp::default(),
            };
            base += count;
        }

        Ok(Self { entries, types })
    }

    fn type_info(&self, ty: TsType) -> &TypeInfo {
        &self.types[ty.tag() as usize]
    }

    fn type_info_mut(&mut self, ty: TsType) -> &mut TypeInfo {
        &mut self.types[ty.tag() as usize]
    }

    /// Evict the LRU slot of `ty`'s partition, folding its timestamps
    /// into the type's water mark, splice it to the MRU end, and
    /// return its (now bumped) handle ready for reuse.
    fn evict_lru(&mut self, ty: TsType, parent: Option<TsHandle>, hash: u64) -> TsHandle {
        let info = *self.type_info(ty);
        let slot = info.lru;

        if self.entries[slot as usize].occupied {
            let evicted = &self.entries[slot as usize];
            let (rl, rh, w) = (evicted.rl, evicted.rh, evicted.w);
            let t = self.type_info_mut(ty);
            t.water_rl = t.water_rl.max(rl);
            t.water_rh = t.water_rh.max(rh);
            t.water_w = t.water_w.max(w);
        }

        // The ring's prev/next pointers never change here: lru/mru are
        // just markers rotating around a fixed ring. Real relinking
        // only happens in `touch`, which pulls a slot out of the
        // middle of the ring instead of its head.
        let new_lru = self.entries[slot as usize].next;
        let t = self.type_info_mut(ty);
        t.lru = new_lru;
        t.mru = slot;
        let water = (t.water_rl, t.water_rh, t.water_w);

        let entry = &mut self.entries[slot as usize];
        entry.occupied = true;
        entry.generation = entry.generation.wrapping_add(1);
        entry.parent = parent;
        entry.hash = hash;
        entry.rl = water.0;
        entry.rh = water.1;
        entry.w = water.2;
        for m in entry.miss_idx.iter_mut() {
            *m = None;
        }

        TsHandle::new(slot, entry.generation)
    }

    /// Allocate a fresh slot of `ty`, evicting the LRU entry of that
    /// type's partition if necessary.
    pub fn alloc(&mut self, parent: Option<TsHandle>, ty: TsType, hash: u64) -> TsHandle {
        self.evict_lru(ty, parent, hash)
    }

    /// True if `handle` still refers to a live entry (has not been
    /// evicted and reused since it was issued).
    #[must_use]
    pub fn is_live(&self, handle: TsHandle) -> bool {
        self.entries
            .get(handle.slot() as usize)
            .is_some_and(|e| e.occupied && e.generation == handle.generation())
    }

    fn entry(&self, handle: TsHandle) -> Option<&Entry> {
        self.entries
            .get(handle.slot() as usize)
            .filter(|e| e.occupied && e.generation == handle.generation())
    }

    fn entry_mut(&mut self, handle: TsHandle) -> Option<&mut Entry> {
        self.entries
            .get_mut(handle.slot() as usize)
            .filter(|e| e.occupied && e.generation == handle.generation())
    }

    #[must_use]
    pub fn ty(&self, handle: TsHandle) -> Option<TsType> {
        self.entry(handle).map(|e| e.ty)
    }

    #[must_use]
    pub fn parent(&self, handle: TsHandle) -> Option<TsHandle> {
        self.entry(handle).and_then(|e| e.parent)
    }

    #[must_use]
    pub fn timestamps(&self, handle: TsHandle) -> Option<(Timestamp, Timestamp, Timestamp)> {
        self.entry(handle).map(|e| (e.rl, e.rh, e.w))
    }

    pub fn set_timestamps(&mut self, handle: TsHandle, rl: Timestamp, rh: Timestamp, w: Timestamp) {
        if let Some(e) = self.entry_mut(handle) {
            e.rl = rl;
            e.rh = rh;
            e.w = w;
        }
    }

    /// Move `handle`'s slot to the MRU end of its type's list, marking
    /// it recently used so a hot key survives eviction pressure.
    pub fn touch(&mut self, handle: TsHandle) {
        let Some(entry) = self.entry(handle) else {
            return;
        };
        let ty = entry.ty;
        let slot = handle.slot();
        let info = *self.type_info(ty);
        if info.mru == slot {
            return;
        }
        let prev = self.entries[slot as usize].prev;
        let next = self.entries[slot as usize].next;
        self.entries[prev as usize].next = next;
        self.entries[next as usize].prev = prev;

        let old_mru = info.mru;
        self.entries[old_mru as usize].next = slot;
        self.entries[slot as usize].prev = old_mru;
        self.entries[slot as usize].next = info.lru;
        self.entries[info.lru as usize].prev = slot;

        let t = self.type_info_mut(ty);
        t.mru = slot;
        if t.lru == slot {
            t.lru = next;
        }
    }

    /// Look up or allocate the negative entry for `hash` under
    /// `parent`, reusing the bucket in `parent`'s miss index if it
    /// still points at a live entry.
    pub fn get_negative(&mut self, parent: TsHandle, hash: u64) -> Option<TsHandle> {
        let parent_ty = self.entry(parent)?.ty;
        let neg_ty = parent_ty.negative_child()?;
        let mask = self.type_info(parent_ty).cache_mask;
        let bucket = (hash & u64::from(mask)) as usize;

        if let Some(existing) = self.entries[parent.slot() as usize].miss_idx[bucket] {
            if self.is_live(existing) {
                return Some(existing);
            }
        }

        let handle = self.alloc(Some(parent), neg_ty, hash);
        self.entries[parent.slot() as usize].miss_idx[bucket] = Some(handle);
        Some(handle)
    }

    /// Promote a negative entry to a fresh positive slot of its child
    /// type, carrying its timestamps forward (the key is the same
    /// logical entity; it should not look younger than activity
    /// already observed against the negative placeholder).
    ///
    /// A negative entry stands in for a would-be *child* of its parent,
    /// so `ContNeg` (caching "this container has no such object") is
    /// materialized as an `Obj`, not another `Cont`.
    pub fn promote(&mut self, handle: TsHandle) -> Option<TsHandle> {
        let entry = self.entry(handle)?;
        let ty = entry.ty;
        let parent = entry.parent;
        let hash = entry.hash;
        let (rl, rh, w) = (entry.rl, entry.rh, entry.w);

        if !ty.is_negative() {
            return None;
        }
        let positive_ty = ty.child()?;

        let new_handle = self.alloc(parent, positive_ty, hash);
        self.set_timestamps(new_handle, rl, rh, w);
        Some(new_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_table() -> TsTable {
        TsTable::new(TsTableConfig::with_bits(14)).unwrap()
    }

    #[test]
    fn fresh_handle_is_live() {
        let mut table = small_table();
        let h = table.alloc(None, TsType::Cont, 1);
        assert!(table.is_live(h));
    }

    #[test]
    fn stale_handle_becomes_dead_after_full_eviction_cycle() {
        let mut table = small_table();
        let first = table.alloc(None, TsType::Cont, 1);
        // Cycle through the whole Cont partition so `first`'s slot gets reused.
        let count = table.type_info(TsType::Cont).count;
        for i in 0..count {
            table.alloc(None, TsType::Cont, u64::from(i) + 2);
        }
        assert!(!table.is_live(first));
    }

    #[test]
    fn eviction_folds_timestamps_into_the_water_mark() {
        let mut table = small_table();
        let h = table.alloc(None, TsType::Cont, 1);
        table.set_timestamps(h, Timestamp::new(5, 0), Timestamp::new(5, 0), Timestamp::new(5, 0));

        let count = table.type_info(TsType::Cont).count;
        for i in 0..count {
            table.alloc(None, TsType::Cont, u64::from(i) + 2);
        }
        let newest = table.alloc(None, TsType::Cont, 999);
        let (rl, _, _) = table.timestamps(newest).unwrap();
        assert!(rl.epoch >= 5, "new entry should inherit the water mark floor");
    }

    #[test]
    fn get_negative_reuses_the_same_bucket() {
        let mut table = small_table();
        let parent = table.alloc(None, TsType::Cont, 1);
        let a = table.get_negative(parent, 42).unwrap();
        let b = table.get_negative(parent, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(table.ty(a), Some(TsType::ContNeg));
    }

    #[test]
    fn akey_has_no_negative_entries() {
        let mut table = small_table();
        let akey = table.alloc(None, TsType::AKey, 1);
        assert!(table.get_negative(akey, 1).is_none());
    }

    #[test]
    fn water_mark_never_decreases_under_random_churn() {
        use rand::Rng;
        let mut table = small_table();
        let mut rng = rand::thread_rng();
        let mut last_floor = Timestamp::default();
        for i in 0..2000u64 {
            let h = table.alloc(None, TsType::Cont, i);
            let (rl, _, _) = table.timestamps(h).unwrap();
            assert!(rl >= last_floor, "water mark floor regressed at iteration {i}");
            last_floor = rl;
            let epoch: u64 = rng.gen_range(0..1_000_000);
            table.set_timestamps(h, Timestamp::new(epoch, 0), Timestamp::new(epoch, 0), Timestamp::new(epoch, 0));
        }
    }

    #[test]
    fn promote_carries_timestamps_forward() {
        let mut table = small_table();
        let parent = table.alloc(None, TsType::Cont, 1);
        let neg = table.get_negative(parent, 7).unwrap();
        table.set_timestamps(neg, Timestamp::new(3, 1), Timestamp::new(3, 1), Timestamp::new(3, 1));
        let positive = table.promote(neg).unwrap();
        assert_eq!(table.ty(positive), Some(TsType::Obj));
        let (rl, _, _) = table.timestamps(positive).unwrap();
        assert_eq!(rl, Timestamp::new(3, 1));
    }
}
