//! Identifier types shared by the placement engine and the TS cache.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A 128-bit object identifier.
///
/// Placement only ever hashes the low 64 bits (see [`ObjectId::lo`]);
/// the high 64 bits are carried for callers that need a fuller identity
/// (metadata lookups, logging) but are never interpreted by the
/// placement engine itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl ObjectId {
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn from_parts(hi: u64, lo: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&hi.to_be_bytes());
        bytes[8..].copy_from_slice(&lo.to_be_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// The half of the identifier the placement engine hashes on.
    #[must_use]
    pub fn lo(&self) -> u64 {
        let bytes = self.0.as_bytes();
        u64::from_be_bytes(bytes[8..16].try_into().unwrap())
    }

    #[must_use]
    pub fn hi(&self) -> u64 {
        let bytes = self.0.as_bytes();
        u64::from_be_bytes(bytes[0..8].try_into().unwrap())
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
