//! ObjectIO Placement - mapless jump-hash data placement
//!
//! A pool topology is a fault-domain tree; this crate turns it plus an
//! object id into a deterministic shard layout without ever
//! materializing a full placement map in memory. Two properties fall
//! out of using jump consistent hashing at every level of the walk:
//!
//! - **Determinism**: the same (topology, object id, shard index)
//!   always lands on the same target.
//! - **Minimal disruption**: adding a target to a domain only ever
//!   reassigns shards into the new target, never shuffles existing
//!   placements between old targets.
//!
//! # Example
//! ```ignore
//! use objectio_placement::{ObjectMetadata, PlacementMap};
//!
//! let map = PlacementMap::create(topology)?;
//! let layout = map.place(ObjectMetadata { object_id, group_count: 1, group_size: 4 })?;
//! ```

pub mod bitmap;
pub mod hash;
pub mod map;
pub mod policy;
pub mod topology;

pub use hash::{crc_seed, jump_consistent_hash};
pub use map::{
    FirstShardLeader, Layout, LeaderOracle, ObjectMetadata, PlacementMap, RemapEntry,
    ShardPlacement,
};
pub use policy::{ObjectClassProvider, PlacementPolicy, StaticClassTable};
pub use topology::{DomainSpec, Rank, Target, TargetId, TargetStatus, Topology};
