//! The fault-domain tree the placement engine walks.
//!
//! A pool topology is a generic n-ary tree: internal nodes are fault
//! domains (racks, nodes, whatever grouping the deployment cares
//! about), leaves hold the targets data actually lands on. The engine
//! never interprets what a domain level *means* — only its position in
//! the tree and how many targets live under it.
//!
//! Internally the tree is flattened into an arena at construction time
//! so every domain has a stable index and children of a domain occupy a
//! contiguous block of that arena. That contiguity is what lets the
//! per-call scratch [`crate::bitmap::Bitmap`] address "has this domain
//! been used" with a single bit per arena slot instead of a hash map.

use std::fmt;

use objectio_common::{Error, Result};

pub type TargetId = u32;
pub type Rank = u32;

/// Availability of a single target, as observed by the caller-supplied
/// topology snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetStatus {
    Available,
    Unavailable,
    Down,
    DownOut,
    Unknown,
}

impl TargetStatus {
    /// True for statuses the placement engine must route around.
    #[must_use]
    pub fn is_unavailable(self) -> bool {
        !matches!(self, Self::Available)
    }
}

/// A single storage target: the unit placement actually assigns shards
/// to.
#[derive(Clone, Copy, Debug)]
pub struct Target {
    pub id: TargetId,
    pub rank: Rank,
    pub status: TargetStatus,
    pub fail_seq: u64,
}

impl Target {
    #[must_use]
    pub fn new(id: TargetId, rank: Rank) -> Self {
        Self {
            id,
            rank,
            status: TargetStatus::Available,
            fail_seq: 0,
        }
    }
}

/// A node in the domain tree before flattening: either an internal
/// fault domain with child domains, or a leaf domain holding targets
/// directly.
pub enum DomainSpec {
    Domain(Vec<DomainSpec>),
    Leaf(Vec<Target>),
}

/// One flattened arena slot.
#[derive(Clone)]
enum FlatNode {
    Domain { child_base: u32, child_count: u32 },
    Leaf { targets: Vec<Target> },
}

/// A pool topology, flattened into an arena for O(1) indexed access
/// during placement.
#[derive(Clone)]
pub struct Topology {
    nodes: Vec<FlatNode>,
    version: u64,
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("nodes", &self.nodes.len())
            .field("version", &self.version)
            .finish()
    }
}

pub const ROOT: u32 = 0;

impl Topology {
    /// Flatten `root` into an arena. Root is always arena index
    /// [`ROOT`].
    #[must_use]
    pub fn build(root: DomainSpec, version: u64) -> Self {
        let mut nodes = Vec::new();
        flatten(root, &mut nodes);
        Self { nodes, version }
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Total number of arena slots (domains and leaves), used to size
    /// the per-call `dom_used` bitmap.
    #[must_use]
    pub fn domain_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_leaf(&self, idx: u32) -> bool {
        matches!(self.nodes[idx as usize], FlatNode::Leaf { .. })
    }

    /// Contiguous `[child_base, child_base + child_count)` range of an
    /// internal domain's children.
    #[must_use]
    pub fn children(&self, idx: u32) -> (u32, u32) {
        match &self.nodes[idx as usize] {
            FlatNode::Domain {
                child_base,
                child_count,
            } => (*child_base, *child_count),
            FlatNode::Leaf { .. } => (0, 0),
        }
    }

    #[must_use]
    pub fn targets(&self, idx: u32) -> &[Target] {
        match &self.nodes[idx as usize] {
            FlatNode::Leaf { targets } => targets,
            FlatNode::Domain { .. } => &[],
        }
    }

    pub fn target_mut(&mut self, idx: u32, target_id: TargetId) -> Option<&mut Target> {
        match &mut self.nodes[idx as usize] {
            FlatNode::Leaf { targets } => targets.iter_mut().find(|t| t.id == target_id),
            FlatNode::Domain { .. } => None,
        }
    }

    /// Total number of targets reachable under `idx`, used to validate
    /// that a requested layout width fits the topology.
    #[must_use]
    pub fn target_count(&self, idx: u32) -> usize {
        match &self.nodes[idx as usize] {
            FlatNode::Leaf { targets } => targets.len(),
            FlatNode::Domain {
                child_base,
                child_count,
            } => (*child_base..*child_base + *child_count)
                .map(|c| self.target_count(c))
                .sum(),
        }
    }

    /// Mark a target down or back up, bumping its fail sequence when it
    /// transitions into unavailability.
    pub fn set_target_status(&mut self, target_id: TargetId, status: TargetStatus) -> Result<()> {
        for node in &mut self.nodes {
            if let FlatNode::Leaf { targets } = node {
                if let Some(t) = targets.iter_mut().find(|t| t.id == target_id) {
                    if status.is_unavailable() && !t.status.is_unavailable() {
                        t.fail_seq += 1;
                    }
                    t.status = status;
                    return Ok(());
                }
            }
        }
        Err(Error::not_found(format!("target {target_id}")))
    }

    pub fn find_target(&self, target_id: TargetId) -> Option<&Target> {
        self.nodes.iter().find_map(|n| match n {
            FlatNode::Leaf { targets } => targets.iter().find(|t| t.id == target_id),
            FlatNode::Domain { .. } => None,
        })
    }
}

fn flatten(spec: DomainSpec, nodes: &mut Vec<FlatNode>) -> u32 {
    match spec {
        DomainSpec::Leaf(targets) => {
            let idx = nodes.len() as u32;
            nodes.push(FlatNode::Leaf { targets });
            idx
        }
        DomainSpec::Domain(children) => {
            let idx = nodes.len() as u32;
            // Reserve this slot before recursing so indices assigned to
            // descendants never collide with it.
            nodes.push(FlatNode::Domain {
                child_base: 0,
                child_count: 0,
            });
            let child_base = nodes.len() as u32;
            for child in children {
                flatten(child, nodes);
            }
            let child_count = nodes.len() as u32 - child_base;
            nodes[idx as usize] = FlatNode::Domain {
                child_base,
                child_count,
            };
            idx
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(ids: &[u32]) -> DomainSpec {
        DomainSpec::Leaf(ids.iter().map(|&id| Target::new(id, id)).collect())
    }

    fn small_topology() -> Topology {
        // root -> 3 racks -> 2 targets each
        let root = DomainSpec::Domain(vec![leaf(&[0, 1]), leaf(&[2, 3]), leaf(&[4, 5])]);
        Topology::build(root, 1)
    }

    #[test]
    fn children_are_contiguous() {
        let topo = small_topology();
        let (base, count) = topo.children(ROOT);
        assert_eq!(count, 3);
        for i in 0..3 {
            assert!(topo.is_leaf(base + i));
        }
    }

    #[test]
    fn target_count_sums_the_whole_tree() {
        let topo = small_topology();
        assert_eq!(topo.target_count(ROOT), 6);
    }

    #[test]
    fn set_status_bumps_fail_seq_once_per_transition() {
        let mut topo = small_topology();
        topo.set_target_status(2, TargetStatus::Down).unwrap();
        assert_eq!(topo.find_target(2).unwrap().fail_seq, 1);
        // staying down should not bump it again
        topo.set_target_status(2, TargetStatus::DownOut).unwrap();
        assert_eq!(topo.find_target(2).unwrap().fail_seq, 1);
        topo.set_target_status(2, TargetStatus::Available).unwrap();
        topo.set_target_status(2, TargetStatus::Down).unwrap();
        assert_eq!(topo.find_target(2).unwrap().fail_seq, 2);
    }

    #[test]
    fn unknown_target_is_not_found() {
        let mut topo = small_topology();
        assert!(topo.set_target_status(999, TargetStatus::Down).is_err());
    }
}
