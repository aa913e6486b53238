//! Monotone timestamp updates and the conflict predicates built on top
//! of them.
//!
//! Every table entry carries three timestamps: `rl` (read-low, the
//! highest epoch any reader has observed), `rh` (read-high, the
//! highest epoch any reader has probed without necessarily finding
//! data there) and `w` (write, the epoch of the last write). Reads
//! only ever push `rl`/`rh` forward; writes are rejected outright
//! rather than applied if they would move `w` backward or sideways —
//! that would mean two writers disagreeing about which one happened
//! first, which the cache cannot resolve on its own.

use crate::table::TsTable;
use crate::types::{Timestamp, TsHandle};

/// Push `entry`'s read-low timestamp forward to `ts`, if `ts` is newer.
pub fn update_read_low(table: &mut TsTable, entry: TsHandle, ts: Timestamp) {
    if let Some((rl, rh, w)) = table.timestamps(entry) {
        table.set_timestamps(entry, rl.max(ts), rh, w);
    }
}

/// Push `entry`'s read-high timestamp forward to `ts`, if `ts` is newer.
pub fn update_read_high(table: &mut TsTable, entry: TsHandle, ts: Timestamp) {
    if let Some((rl, rh, w)) = table.timestamps(entry) {
        table.set_timestamps(entry, rl, rh.max(ts), w);
    }
}

/// Advance `entry`'s write timestamp to `ts`. Returns `false` without
/// modifying anything if `ts` does not strictly exceed the current
/// write timestamp — a write at or before a known write is discarded,
/// never silently reordered.
pub fn update_write(table: &mut TsTable, entry: TsHandle, ts: Timestamp) -> bool {
    let Some((rl, rh, w)) = table.timestamps(entry) else {
        return false;
    };
    if ts <= w {
        return false;
    }
    table.set_timestamps(entry, rl, rh, ts);
    true
}

/// True if writing at `ts` would violate a read already recorded
/// against `entry`'s read-low timestamp.
#[must_use]
pub fn check_rl_conflict(table: &TsTable, entry: TsHandle, ts: Timestamp) -> bool {
    table.timestamps(entry).is_some_and(|(rl, _, _)| ts <= rl)
}

/// True if writing at `ts` would violate a read already recorded
/// against `entry`'s read-high timestamp.
#[must_use]
pub fn check_rh_conflict(table: &TsTable, entry: TsHandle, ts: Timestamp) -> bool {
    table.timestamps(entry).is_some_and(|(_, rh, _)| ts <= rh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TsTableConfig;
    use crate::types::TsType;

    fn handle() -> (TsTable, TsHandle) {
        let mut table = TsTable::new(TsTableConfig::with_bits(14)).unwrap();
        let h = table.alloc(None, TsType::Cont, 1);
        (table, h)
    }

    #[test]
    fn read_timestamps_only_move_forward() {
        let (mut table, h) = handle();
        update_read_low(&mut table, h, Timestamp::new(10, 0));
        update_read_low(&mut table, h, Timestamp::new(3, 0));
        let (rl, _, _) = table.timestamps(h).unwrap();
        assert_eq!(rl, Timestamp::new(10, 0));
    }

    #[test]
    fn write_rejects_non_advancing_timestamps() {
        let (mut table, h) = handle();
        assert!(update_write(&mut table, h, Timestamp::new(5, 0)));
        assert!(!update_write(&mut table, h, Timestamp::new(5, 0)));
        assert!(!update_write(&mut table, h, Timestamp::new(4, 9)));
        let (_, _, w) = table.timestamps(h).unwrap();
        assert_eq!(w, Timestamp::new(5, 0));
    }

    #[test]
    fn rl_conflict_detects_writes_behind_a_read() {
        let (mut table, h) = handle();
        update_read_low(&mut table, h, Timestamp::new(10, 0));
        assert!(check_rl_conflict(&table, h, Timestamp::new(10, 0)));
        assert!(check_rl_conflict(&table, h, Timestamp::new(5, 0)));
        assert!(!check_rl_conflict(&table, h, Timestamp::new(11, 0)));
    }

    #[test]
    fn rh_conflict_is_independent_of_rl() {
        let (mut table, h) = handle();
        update_read_high(&mut table, h, Timestamp::new(20, 0));
        assert!(check_rh_conflict(&table, h, Timestamp::new(20, 0)));
        assert!(!check_rh_conflict(&table, h, Timestamp::new(21, 0)));
        assert!(!check_rl_conflict(&table, h, Timestamp::new(21, 0)));
    }
}
