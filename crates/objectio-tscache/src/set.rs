//! The per-operation timestamp scratchpad.
//!
//! A single read or write touches a bounded chain of keys — a
//! container, an object, a dkey, and zero or more akeys — and needs to
//! remember which table entry backs each of them for the lifetime of
//! the operation. [`TsSet`] is that scratchpad: depth 0 is the
//! container, depth 1 the object, depth 2 the dkey, and depths `3..`
//! hold one slot per akey the operation touches.

use objectio_common::{Error, Result};

use crate::table::TsTable;
use crate::types::TsHandle;

struct SetEntry {
    handle: TsHandle,
    hash: u64,
    /// Set by [`TsSet::mark_entry`] when this slot was freshly created
    /// (as opposed to looked up) during the operation, so a later
    /// commit knows it needs [`TsSet::upgrade`].
    created: bool,
}

/// Fixed-depth scratchpad for one operation's timestamp entries.
pub struct TsSet {
    entries: Vec<Option<SetEntry>>,
}

pub const DEPTH_CONT: usize = 0;
pub const DEPTH_OBJ: usize = 1;
pub const DEPTH_DKEY: usize = 2;
pub const DEPTH_AKEY_BASE: usize = 3;

impl TsSet {
    /// `akey_capacity` is the number of distinct akeys the operation
    /// may touch; depths `3..3+akey_capacity` are reserved for them.
    #[must_use]
    pub fn new(akey_capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(DEPTH_AKEY_BASE + akey_capacity);
        entries.resize_with(DEPTH_AKEY_BASE + akey_capacity, || None);
        Self { entries }
    }

    pub fn reset(&mut self) {
        for e in &mut self.entries {
            *e = None;
        }
    }

    #[must_use]
    pub fn lookup(&self, depth: usize) -> Option<TsHandle> {
        self.entries.get(depth)?.as_ref().map(|e| e.handle)
    }

    /// The set entry that should act as the parent for `depth`, capped
    /// at the dkey level — every akey shares the same dkey parent.
    #[must_use]
    pub fn parent_for(&self, depth: usize) -> Option<TsHandle> {
        if depth == 0 {
            return None;
        }
        self.lookup((depth - 1).min(DEPTH_DKEY))
    }

    /// Record that `handle` (found via lookup, or freshly allocated)
    /// backs `depth` for the rest of this operation.
    pub fn record(&mut self, depth: usize, handle: TsHandle, hash: u64) -> Result<()> {
        let slot = self
            .entries
            .get_mut(depth)
            .ok_or_else(|| Error::invalid_argument(format!("set has no depth {depth}")))?;
        *slot = Some(SetEntry {
            handle,
            hash,
            created: false,
        });
        Ok(())
    }

    /// Look up an existing entry at `depth` via the table, allocating a
    /// positive slot and recording it if none exists yet.
    pub fn alloc(&mut self, table: &mut TsTable, depth: usize, ty: crate::types::TsType, hash: u64) -> Result<TsHandle> {
        if let Some(existing) = self.lookup(depth) {
            if table.is_live(existing) {
                table.touch(existing);
                return Ok(existing);
            }
        }
        let parent = self.parent_for(depth);
        let handle = table.alloc(parent, ty, hash);
        self.record(depth, handle, hash)?;
        Ok(handle)
    }

    /// Fetch (or create) the negative entry caching "no child with this
    /// key" under the entry at `parent_depth`.
    pub fn get_negative(&mut self, table: &mut TsTable, parent_depth: usize, hash: u64) -> Result<TsHandle> {
        let parent = self
            .lookup(parent_depth)
            .ok_or_else(|| Error::invalid_argument(format!("no entry recorded at depth {parent_depth}")))?;
        table
            .get_negative(parent, hash)
            .ok_or_else(|| Error::invalid_argument("parent type has no negative counterpart"))
    }

    /// Mark the entry at `depth` as freshly created by this operation,
    /// so a subsequent commit upgrades it from negative to positive.
    pub fn mark_entry(&mut self, depth: usize) -> Result<()> {
        let slot = self
            .entries
            .get_mut(depth)
            .and_then(|e| e.as_mut())
            .ok_or_else(|| Error::invalid_argument(format!("no entry recorded at depth {depth}")))?;
        slot.created = true;
        Ok(())
    }

    /// After a successful commit, promote any entry at `depth` marked
    /// by [`Self::mark_entry`] from its negative placeholder to a real
    /// positive entry. A no-op if the entry was not marked.
    pub fn upgrade(&mut self, table: &mut TsTable, depth: usize) -> Result<()> {
        let needs_upgrade = matches!(self.entries.get(depth), Some(Some(e)) if e.created);
        if !needs_upgrade {
            return Ok(());
        }
        let handle = self.entries[depth].as_ref().unwrap().handle;
        if let Some(new_handle) = table.promote(handle) {
            self.entries[depth].as_mut().unwrap().handle = new_handle;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{TsTable, TsTableConfig};
    use crate::types::TsType;

    fn table() -> TsTable {
        TsTable::new(TsTableConfig::with_bits(14)).unwrap()
    }

    #[test]
    fn alloc_reuses_a_recorded_entry() {
        let mut table = table();
        let mut set = TsSet::new(4);
        let a = set.alloc(&mut table, DEPTH_CONT, TsType::Cont, 1).unwrap();
        let b = set.alloc(&mut table, DEPTH_CONT, TsType::Cont, 1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parent_for_akeys_is_always_the_dkey() {
        let mut table = table();
        let mut set = TsSet::new(4);
        set.alloc(&mut table, DEPTH_CONT, TsType::Cont, 1).unwrap();
        set.alloc(&mut table, DEPTH_OBJ, TsType::Obj, 2).unwrap();
        let dkey = set.alloc(&mut table, DEPTH_DKEY, TsType::DKey, 3).unwrap();
        assert_eq!(set.parent_for(DEPTH_AKEY_BASE), Some(dkey));
        assert_eq!(set.parent_for(DEPTH_AKEY_BASE + 1), Some(dkey));
    }

    #[test]
    fn mark_and_upgrade_promotes_negative_to_positive() {
        let mut table = table();
        let mut set = TsSet::new(1);
        set.alloc(&mut table, DEPTH_CONT, TsType::Cont, 1).unwrap();
        let neg = set.get_negative(&mut table, DEPTH_CONT, 77).unwrap();
        set.record(DEPTH_OBJ, neg, 77).unwrap();
        assert_eq!(table.ty(neg), Some(TsType::ContNeg));

        set.mark_entry(DEPTH_OBJ).unwrap();
        set.upgrade(&mut table, DEPTH_OBJ).unwrap();

        let upgraded = set.lookup(DEPTH_OBJ).unwrap();
        assert_eq!(table.ty(upgraded), Some(TsType::Obj));
    }

    #[test]
    fn upgrade_without_mark_is_a_no_op() {
        let mut table = table();
        let mut set = TsSet::new(1);
        let cont = set.alloc(&mut table, DEPTH_CONT, TsType::Cont, 1).unwrap();
        set.upgrade(&mut table, DEPTH_CONT).unwrap();
        assert_eq!(set.lookup(DEPTH_CONT), Some(cont));
    }
}
