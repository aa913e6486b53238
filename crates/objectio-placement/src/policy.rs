//! A thread-safe handle around a [`PlacementMap`] that can be swapped
//! out when the topology changes, plus the redundancy-shape lookup a
//! caller needs before it can call [`PlacementMap::place`].

use std::collections::HashMap;
use std::sync::Arc;

use objectio_common::{Error, ObjectId, Result};
use parking_lot::RwLock;

use crate::map::{Layout, ObjectMetadata, PlacementMap, RemapEntry, LeaderOracle};
use crate::topology::{Rank, Topology};

/// Resolves the redundancy shape (group count and width) an object
/// class maps to. Kept separate from the placement map itself: which
/// class an object belongs to is a metadata decision, not a placement
/// one.
pub trait ObjectClassProvider: Send + Sync {
    fn resolve(&self, object_id: ObjectId) -> Result<(u16, u16)>;
}

/// A static table of named redundancy shapes, keyed by a class tag
/// carried in the object id's high bits.
#[derive(Default)]
pub struct StaticClassTable {
    classes: HashMap<u16, (u16, u16)>,
    default_class: Option<u16>,
}

impl StaticClassTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, tag: u16, group_count: u16, group_size: u16) {
        self.classes.insert(tag, (group_count, group_size));
        if self.default_class.is_none() {
            self.default_class = Some(tag);
        }
    }

    pub fn set_default(&mut self, tag: u16) {
        self.default_class = Some(tag);
    }
}

impl ObjectClassProvider for StaticClassTable {
    fn resolve(&self, object_id: ObjectId) -> Result<(u16, u16)> {
        let tag = (object_id.hi() >> 48) as u16;
        if let Some(shape) = self.classes.get(&tag) {
            return Ok(*shape);
        }
        self.default_class
            .and_then(|d| self.classes.get(&d))
            .copied()
            .ok_or_else(|| Error::not_found("no object class registered"))
    }
}

/// A live, swappable placement map plus the object-class table needed
/// to turn a bare object id into a [`ObjectMetadata`] request.
pub struct PlacementPolicy {
    map: Arc<RwLock<PlacementMap>>,
    classes: Arc<dyn ObjectClassProvider>,
}

impl PlacementPolicy {
    #[must_use]
    pub fn new(map: PlacementMap, classes: Arc<dyn ObjectClassProvider>) -> Self {
        Self {
            map: Arc::new(RwLock::new(map)),
            classes,
        }
    }

    /// Install a new topology snapshot, e.g. after a membership change.
    pub fn update_topology(&self, map: PlacementMap) {
        *self.map.write() = map;
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.map.read().version()
    }

    pub fn place_object(&self, object_id: ObjectId) -> Result<Layout> {
        let (group_count, group_size) = self.classes.resolve(object_id)?;
        let metadata = ObjectMetadata {
            object_id,
            group_count,
            group_size,
        };
        self.map.read().place(metadata)
    }

    pub fn find_rebuild(
        &self,
        object_id: ObjectId,
        old_layout: &Layout,
        rebuild_version: u64,
        leader: &dyn LeaderOracle,
        self_rank: Option<Rank>,
    ) -> Result<Vec<RemapEntry>> {
        let (group_count, group_size) = self.classes.resolve(object_id)?;
        let metadata = ObjectMetadata {
            object_id,
            group_count,
            group_size,
        };
        self.map
            .read()
            .find_rebuild(metadata, old_layout, rebuild_version, leader, self_rank)
    }
}
