//! Type-safe snapshot identifier.
//!
//! [`SnapshotId`] is a newtype wrapper around [`uuid::Uuid`] (v4) so that
//! snapshot identifiers cannot be confused with other UUIDs.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier for a persisted statistics snapshot.
///
/// Generated once when the snapshot is created and immutable thereafter.
/// The compare-and-swap update addresses the current snapshot by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct SnapshotId(uuid::Uuid);

impl SnapshotId {
    /// Creates a new random `SnapshotId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `SnapshotId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for SnapshotId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl From<SnapshotId> for uuid::Uuid {
    fn from(id: SnapshotId) -> Self {
        id.0
    }
}
