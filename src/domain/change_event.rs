//! Change notifications delivered by the change source.
//!
//! A [`ChangeEvent`] is an opaque trigger: it says that something changed in
//! a collection, never by how much. Handlers always re-derive their metrics
//! from a full read of the collection.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Collection;

/// Opaque position in a collection's change stream.
///
/// Resubscribing with the last seen token asks the source to replay every
/// event after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeToken(u64);

impl ResumeToken {
    /// Creates a token from a stream sequence number.
    #[must_use]
    pub const fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    /// Returns the sequence number behind the token.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of write that produced a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// A document was inserted.
    Insert,
    /// A document was modified.
    Update,
    /// A document was replaced wholesale.
    Replace,
    /// A document was deleted.
    Delete,
    /// Any other operation reported by the source.
    #[serde(other)]
    Other,
}

/// A single notification from a collection's change stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Collection the change happened in.
    pub collection: Collection,
    /// Kind of write.
    pub operation: OperationKind,
    /// Affected document, when the source reports it.
    pub document_id: Option<String>,
    /// Stream position of this event.
    pub resume_token: ResumeToken,
    /// Time the source observed the change.
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(
        collection: Collection,
        operation: OperationKind,
        document_id: Option<String>,
        resume_token: ResumeToken,
    ) -> Self {
        Self {
            collection,
            operation,
            document_id,
            resume_token,
            timestamp: Utc::now(),
        }
    }
}
