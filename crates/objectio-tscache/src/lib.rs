//! ObjectIO TS Cache - per-thread timestamp cache for conflict
//! detection.
//!
//! Every concurrent read and write against a container/object/dkey/akey
//! tree needs to know whether it overlaps with activity it hasn't seen
//! yet. Keeping that history per-key forever isn't viable, so this
//! crate keeps a fixed-size, type-partitioned cache of "the latest
//! timestamps seen for this key" ([`table::TsTable`]), a per-operation
//! scratchpad remembering which cache entries back the current call
//! ([`set::TsSet`]), and the monotone update/conflict operators
//! ([`ops`]) built on top of both.
//!
//! A table is meant to be owned by a single thread; nothing in this
//! crate synchronizes access to it.

pub mod ops;
pub mod set;
pub mod table;
pub mod types;

pub use ops::{check_rh_conflict, check_rl_conflict, update_read_high, update_read_low, update_write};
pub use set::{TsSet, DEPTH_AKEY_BASE, DEPTH_CONT, DEPTH_DKEY, DEPTH_OBJ};
pub use table::{TsTable, TsTableConfig};
pub use types::{Timestamp, TsHandle, TsType};
