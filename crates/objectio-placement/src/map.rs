//! The mapless placement map: turns a [`Topology`] plus an object id
//! into a deterministic shard layout, and recomputes replacement
//! targets for shards whose assigned target has since gone
//! unavailable.

use objectio_common::{Error, ObjectId, Result};
use tracing::debug;

use crate::bitmap::Bitmap;
use crate::hash::{crc_seed, jump_consistent_hash};
use crate::topology::{Rank, TargetId, TargetStatus, Topology, ROOT};

/// Upper bound on key-reseed retries during a single target selection,
/// guarding against an exhausted or pathologically small topology
/// instead of looping forever.
const MAX_TRIALS: u32 = 64;

/// One shard's position and assigned target in an object's layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardPlacement {
    pub shard_index: u32,
    pub target_id: TargetId,
    pub rank: Rank,
}

/// A complete shard layout for one object, plus the map version it was
/// computed against.
#[derive(Clone, Debug)]
pub struct Layout {
    pub shards: Vec<ShardPlacement>,
    pub map_version: u64,
}

impl Layout {
    #[must_use]
    pub fn target_for_shard(&self, shard_index: u32) -> Option<&ShardPlacement> {
        self.shards.iter().find(|s| s.shard_index == shard_index)
    }
}

/// Number of redundancy groups times the width of each group; the
/// layout width an object's class resolves to.
#[derive(Clone, Copy, Debug)]
pub struct ObjectMetadata {
    pub object_id: ObjectId,
    pub group_count: u16,
    pub group_size: u16,
}

impl ObjectMetadata {
    #[must_use]
    pub fn shard_count(&self) -> u32 {
        u32::from(self.group_count) * u32::from(self.group_size)
    }
}

/// A single shard that needs a new target because its current one is
/// unavailable.
#[derive(Clone, Copy, Debug)]
pub struct RemapEntry {
    pub shard_index: u32,
    pub target_id: TargetId,
    pub rank: Rank,
}

/// Resolves which local shard, if any, leads a redundancy group — only
/// the leader drives the actual rebuild for its group, so
/// [`PlacementMap::find_rebuild`] can be called from every rank without
/// every rank acting on every shard.
pub trait LeaderOracle {
    /// Returns the shard index, within `layout_len`, that leads the
    /// group containing `shard_index`.
    fn select_leader(&self, object_id: ObjectId, shard_index: u32, layout_len: u32) -> u32;
}

/// Default leader policy: the first shard of a group leads it. Pure
/// function of shard index and group size, so it needs no topology
/// access.
pub struct FirstShardLeader {
    pub group_size: u16,
}

impl LeaderOracle for FirstShardLeader {
    fn select_leader(&self, _object_id: ObjectId, shard_index: u32, _layout_len: u32) -> u32 {
        let group_size = u32::from(self.group_size.max(1));
        shard_index - (shard_index % group_size)
    }
}

/// The placement engine: an immutable topology snapshot plus the
/// algorithms that place objects on it.
pub struct PlacementMap {
    topology: Topology,
}

impl PlacementMap {
    /// Build a placement map from a topology snapshot. Fails only if
    /// the topology has no targets at all.
    pub fn create(topology: Topology) -> Result<Self> {
        if topology.target_count(ROOT) == 0 {
            return Err(Error::invalid_argument("topology has no targets"));
        }
        Ok(Self { topology })
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.topology.version()
    }

    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Compute the full shard layout for `object`.
    ///
    /// Each shard's target is the one the deterministic walk lands on
    /// after skipping targets already used by an earlier shard of the
    /// same object and targets that are currently unavailable — an
    /// object is never handed a dead target to begin with, so normal
    /// reads never need [`Self::find_rebuild`] for a target that was
    /// unavailable at placement time.
    pub fn place(&self, object: ObjectMetadata) -> Result<Layout> {
        let shard_count = object.shard_count();
        if shard_count == 0 {
            return Err(Error::invalid_argument("group_count and group_size must be > 0"));
        }
        if shard_count as usize > self.topology.target_count(ROOT) {
            return Err(Error::invalid_argument(format!(
                "layout needs {shard_count} targets but topology only has {}",
                self.topology.target_count(ROOT)
            )));
        }

        let mut dom_used = Bitmap::new(self.topology.domain_count());
        let mut used_targets = Vec::with_capacity(shard_count as usize);
        let mut shards = Vec::with_capacity(shard_count as usize);

        for shard_index in 0..shard_count {
            let key = crc_seed(object.object_id.lo(), shard_index);
            let found = self.get_target(ROOT, key, &mut dom_used, &used_targets, true);
            let Some((target_id, rank)) = found else {
                debug!(shard_index, "placement exhausted available targets");
                continue;
            };
            used_targets.push(target_id);
            shards.push(ShardPlacement {
                shard_index,
                target_id,
                rank,
            });
        }

        Ok(Layout {
            shards,
            map_version: self.topology.version(),
        })
    }

    /// Recompute replacement targets for shards of `old_layout` whose
    /// assigned target is no longer available.
    ///
    /// `rebuild_version` is the map version the caller last observed;
    /// if this map is older than that, the caller is acting on stale
    /// information and the call is rejected rather than silently
    /// producing an inconsistent remap. `self_rank` disables leader
    /// filtering when `None`, mirroring the "no local rank" case.
    pub fn find_rebuild(
        &self,
        object: ObjectMetadata,
        old_layout: &Layout,
        rebuild_version: u64,
        leader: &dyn LeaderOracle,
        self_rank: Option<Rank>,
    ) -> Result<Vec<RemapEntry>> {
        if self.topology.version() < rebuild_version {
            return Err(Error::invalid_argument(format!(
                "map version {} is older than the caller's rebuild version {rebuild_version}",
                self.topology.version()
            )));
        }

        // Replay the original walk, ignoring availability, to recover
        // the domain occupancy the healthy placement would have
        // produced — `get_rebuild_target` needs this to keep rebuilt
        // shards in domains the object doesn't already occupy.
        let shard_count = object.shard_count();
        let mut dom_used = Bitmap::new(self.topology.domain_count());
        let mut used_targets = Vec::with_capacity(shard_count as usize);
        let mut remaps = Vec::new();

        for shard_index in 0..shard_count {
            let key = crc_seed(object.object_id.lo(), shard_index);
            let Some((target_id, _rank)) =
                self.get_target(ROOT, key, &mut dom_used, &used_targets, false)
            else {
                continue;
            };
            used_targets.push(target_id);

            let needs_rebuild = self
                .topology
                .find_target(target_id)
                .is_none_or(|t| t.status.is_unavailable());
            if !needs_rebuild {
                continue;
            }

            if let Some(rank) = self_rank {
                let leader_shard = leader.select_leader(object.object_id, shard_index, shard_count);
                let leader_is_me = old_layout
                    .target_for_shard(leader_shard)
                    .is_some_and(|s| s.rank == rank);
                if !leader_is_me {
                    continue;
                }
            }

            let rebuild_key = crc_seed(key, 1);
            if let Some((new_target, new_rank)) = self.get_rebuild_target(rebuild_key, &dom_used, &used_targets) {
                used_targets.push(new_target);
                remaps.push(RemapEntry {
                    shard_index,
                    target_id: new_target,
                    rank: new_rank,
                });
            }
        }

        Ok(remaps)
    }

    /// Reintegrating a previously failed target back into an existing
    /// layout is not implemented by this engine.
    pub fn find_reintegration(&self, _object: ObjectMetadata) -> Result<Vec<RemapEntry>> {
        Err(Error::not_supported("target reintegration"))
    }

    /// Walk the tree from `start`, descending through domains whose
    /// children are addressed by `dom_used`, to an available, unused
    /// target. `require_available` is `false` when replaying the
    /// original healthy walk for [`Self::find_rebuild`].
    fn get_target(
        &self,
        start: u32,
        key: u64,
        dom_used: &mut Bitmap,
        used_targets: &[TargetId],
        require_available: bool,
    ) -> Option<(TargetId, Rank)> {
        let mut curr = start;
        let mut k = key;
        let mut trial = 0u32;
        let mut depth = 0u32;

        loop {
            if self.topology.is_leaf(curr) {
                return self.pick_leaf_target(curr, k, used_targets, require_available);
            }

            let (child_base, child_count) = self.topology.children(curr);
            if child_count == 0 {
                return None;
            }
            let last = (child_base + child_count - 1) as usize;

            loop {
                let rel = jump_consistent_hash(k, child_count);
                let candidate = child_base + rel;
                if !dom_used.get_bit(candidate as usize) {
                    dom_used.set_bit(candidate as usize);
                    curr = candidate;
                    break;
                }

                trial += 1;
                if trial > MAX_TRIALS {
                    return None;
                }
                k = crc_seed(k, trial);

                // Reset rule: once every child of this domain has been
                // used, free the whole block (and this domain's own
                // bit, so its parent can pick it again) instead of
                // dead-ending — this is what lets shard counts exceed
                // the number of leaves at a given fan-out.
                if dom_used.is_range_set(child_base as usize, last) {
                    dom_used.clear_range(child_base as usize, last);
                    if curr != ROOT {
                        dom_used.clear_bit(curr as usize);
                    }
                }
            }

            // Mix the key before the next level so two levels with equal
            // fan-out and no collisions don't pick the same relative
            // child index.
            depth += 1;
            k = crc_seed(k, depth);
        }
    }

    fn pick_leaf_target(
        &self,
        leaf: u32,
        key: u64,
        used_targets: &[TargetId],
        require_available: bool,
    ) -> Option<(TargetId, Rank)> {
        let targets = self.topology.targets(leaf);
        if targets.is_empty() {
            return None;
        }

        let mut k = key;
        let mut trial = 0u32;
        loop {
            let idx = jump_consistent_hash(k, targets.len() as u32) as usize;
            let candidate = &targets[idx];
            let ok = !used_targets.contains(&candidate.id)
                && (!require_available || !candidate.status.is_unavailable());
            if ok {
                return Some((candidate.id, candidate.rank));
            }

            trial += 1;
            if trial > MAX_TRIALS {
                return None;
            }
            k = crc_seed(key, trial);
        }
    }

    /// Pick a replacement target from a top-level domain the object
    /// does not already occupy, per `dom_used`.
    fn get_rebuild_target(
        &self,
        key: u64,
        dom_used: &Bitmap,
        used_targets: &[TargetId],
    ) -> Option<(TargetId, Rank)> {
        let (base, count) = self.topology.children(ROOT);
        if count == 0 {
            return None;
        }

        let mut k = key;
        let mut trial = 0u32;
        let domain = loop {
            let rel = jump_consistent_hash(k, count);
            let candidate = base + rel;
            if !dom_used.get_bit(candidate as usize) {
                break candidate;
            }
            trial += 1;
            if trial > MAX_TRIALS {
                return None;
            }
            k = crc_seed(key, trial);
        };

        let mut scratch = Bitmap::new(self.topology.domain_count());
        self.get_target(domain, key, &mut scratch, used_targets, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{DomainSpec, Target};

    fn leaf(ids: &[u32]) -> DomainSpec {
        DomainSpec::Leaf(ids.iter().map(|&id| Target::new(id, id)).collect())
    }

    fn balanced_topology(racks: u32, targets_per_rack: u32) -> Topology {
        let mut next_id = 0u32;
        let root = DomainSpec::Domain(
            (0..racks)
                .map(|_| {
                    let ids: Vec<u32> = (0..targets_per_rack).map(|_| {
                        let id = next_id;
                        next_id += 1;
                        id
                    }).collect();
                    leaf(&ids)
                })
                .collect(),
        );
        Topology::build(root, 1)
    }

    fn obj(lo: u64, group_count: u16, group_size: u16) -> ObjectMetadata {
        ObjectMetadata {
            object_id: ObjectId::from_parts(0, lo),
            group_count,
            group_size,
        }
    }

    #[test]
    fn place_is_deterministic() {
        let topo = balanced_topology(6, 4);
        let map = PlacementMap::create(topo).unwrap();
        let object = obj(987_654_321, 1, 4);
        let a = map.place(object).unwrap();
        let b = map.place(object).unwrap();
        assert_eq!(
            a.shards.iter().map(|s| s.target_id).collect::<Vec<_>>(),
            b.shards.iter().map(|s| s.target_id).collect::<Vec<_>>(),
        );
    }

    #[test]
    fn place_never_repeats_a_target_within_an_object() {
        let topo = balanced_topology(5, 5);
        let map = PlacementMap::create(topo).unwrap();
        let object = obj(42, 2, 6);
        let layout = map.place(object).unwrap();
        let mut seen = std::collections::HashSet::new();
        for shard in &layout.shards {
            assert!(seen.insert(shard.target_id), "target reused: {}", shard.target_id);
        }
    }

    #[test]
    fn place_uses_every_requested_shard_when_topology_has_room() {
        let topo = balanced_topology(8, 8);
        let map = PlacementMap::create(topo).unwrap();
        let object = obj(1, 3, 5);
        let layout = map.place(object).unwrap();
        assert_eq!(layout.shards.len(), 15);
    }

    #[test]
    fn place_rejects_layouts_wider_than_the_topology() {
        let topo = balanced_topology(2, 2);
        let map = PlacementMap::create(topo).unwrap();
        let object = obj(1, 1, 10);
        assert!(map.place(object).is_err());
    }

    #[test]
    fn find_rebuild_replaces_only_the_downed_shard() {
        let topo = balanced_topology(6, 4);
        let map_before = PlacementMap::create(topo.clone()).unwrap();
        let object = obj(13, 1, 4);
        let layout = map_before.place(object).unwrap();

        let downed = layout.shards[0].target_id;
        let mut topo = topo;
        topo.set_target_status(downed, TargetStatus::Down).unwrap();
        let map_after = PlacementMap::create(topo).unwrap();

        let leader = FirstShardLeader { group_size: 4 };
        let remaps = map_after
            .find_rebuild(object, &layout, 1, &leader, None)
            .unwrap();

        assert_eq!(remaps.len(), 1);
        assert_eq!(remaps[0].shard_index, layout.shards[0].shard_index);
        assert_ne!(remaps[0].target_id, downed);
    }

    #[test]
    fn find_rebuild_rejects_a_stale_rebuild_version() {
        let topo = balanced_topology(4, 4);
        let map = PlacementMap::create(topo).unwrap();
        let object = obj(5, 1, 4);
        let layout = map.place(object).unwrap();
        let leader = FirstShardLeader { group_size: 4 };
        let err = map
            .find_rebuild(object, &layout, map.version() + 1, &leader, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn reintegration_is_not_supported() {
        let topo = balanced_topology(4, 4);
        let map = PlacementMap::create(topo).unwrap();
        let object = obj(1, 1, 4);
        assert!(matches!(
            map.find_reintegration(object),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn place_is_deterministic_for_many_random_objects() {
        use rand::Rng;
        let topo = balanced_topology(9, 6);
        let map = PlacementMap::create(topo).unwrap();
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let lo: u64 = rng.r#gen();
            let group_size: u16 = rng.gen_range(1..=5);
            let object = obj(lo, 1, group_size);
            let a = map.place(object).unwrap();
            let b = map.place(object).unwrap();
            assert_eq!(
                a.shards.iter().map(|s| s.target_id).collect::<Vec<_>>(),
                b.shards.iter().map(|s| s.target_id).collect::<Vec<_>>(),
            );
        }
    }

    #[test]
    fn leader_filtering_drops_non_leader_remaps() {
        let topo = balanced_topology(6, 4);
        let map_before = PlacementMap::create(topo.clone()).unwrap();
        let object = obj(13, 1, 4);
        let layout = map_before.place(object).unwrap();
        let downed = layout.shards[0].target_id;
        let mut topo = topo;
        topo.set_target_status(downed, TargetStatus::Down).unwrap();
        let map_after = PlacementMap::create(topo).unwrap();
        let leader = FirstShardLeader { group_size: 4 };

        // a rank that doesn't own the leader shard sees no remaps
        let remaps = map_after
            .find_rebuild(object, &layout, 1, &leader, Some(999_999))
            .unwrap();
        assert!(remaps.is_empty());
    }
}
