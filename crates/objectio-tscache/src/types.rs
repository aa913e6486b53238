//! Core types shared by the TS table and the TS set: the type tags
//! that partition the table, a monotone timestamp, and the slot
//! handles consumers hold onto across calls.

use std::cmp::Ordering;

/// The tree level (and positive/negative pairing) a table slot belongs
/// to.
///
/// Four levels exist: container, object, dkey, akey. The first three
/// each have a negative counterpart used to cache "this subtree has no
/// child with this key" — `AKey` has none, since nothing lives below an
/// akey for there to be a missing child of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TsType {
    Cont = 0,
    ContNeg = 1,
    Obj = 2,
    ObjNeg = 3,
    DKey = 4,
    DKeyNeg = 5,
    AKey = 6,
}

impl TsType {
    pub const ALL: [TsType; 7] = [
        Self::Cont,
        Self::ContNeg,
        Self::Obj,
        Self::ObjNeg,
        Self::DKey,
        Self::DKeyNeg,
        Self::AKey,
    ];

    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Tree depth this type belongs to: 0 = container, 1 = object, 2 =
    /// dkey, 3 = akey. Both the positive and negative type of a level
    /// share a depth.
    #[must_use]
    pub fn depth(self) -> u8 {
        self.tag() / 2
    }

    #[must_use]
    pub fn is_negative(self) -> bool {
        matches!(self, Self::ContNeg | Self::ObjNeg | Self::DKeyNeg)
    }

    /// The negative counterpart that caches "no child of this entry
    /// has this key", or `None` for `AKey`, which has no children.
    #[must_use]
    pub fn negative_child(self) -> Option<Self> {
        match self {
            Self::Cont => Some(Self::ContNeg),
            Self::Obj => Some(Self::ObjNeg),
            Self::DKey => Some(Self::DKeyNeg),
            Self::AKey | Self::ContNeg | Self::ObjNeg | Self::DKeyNeg => None,
        }
    }

    /// The positive type one level below this one: `parent.tag() + 2`,
    /// skipping over the sibling negative tag.
    #[must_use]
    pub fn child(self) -> Option<Self> {
        match self {
            Self::Cont | Self::ContNeg => Some(Self::Obj),
            Self::Obj | Self::ObjNeg => Some(Self::DKey),
            Self::DKey | Self::DKeyNeg => Some(Self::AKey),
            Self::AKey => None,
        }
    }
}

/// Number of slots in the table, `2^bits`.
pub const DEFAULT_TABLE_BITS: u32 = 23;

/// A handle to a table slot, carried by consumers across calls.
///
/// The low bits select the slot; the generation disambiguates a handle
/// from a stale one after the slot has been evicted and reused for a
/// different entry — the table's own aliasing check is exactly
/// `table_generation[slot] == handle.generation()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TsHandle {
    slot: u32,
    generation: u32,
}

impl TsHandle {
    #[must_use]
    pub(crate) fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    #[must_use]
    pub fn slot(self) -> u32 {
        self.slot
    }

    #[must_use]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// A monotone (epoch, transaction) pair used for read/write
/// timestamps. Ordered lexicographically so same-epoch operations
/// still have a deterministic tie-break.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub epoch: u64,
    pub tx: u64,
}

impl Timestamp {
    #[must_use]
    pub fn new(epoch: u64, tx: u64) -> Self {
        Self { epoch, tx }
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch.cmp(&other.epoch).then(self.tx.cmp(&other.tx))
    }
}
