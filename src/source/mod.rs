//! Source collections: change feeds and full reads.
//!
//! The engine consumes the document database through two seams:
//! [`ChangeSource`] delivers per-collection change notifications, and
//! [`SourceCollections`] returns every document of a collection for a full
//! recomputation. Change events carry no trusted deltas; they only tell the
//! engine which collection to re-read.

pub mod memory;
pub mod postgres;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::domain::{ChangeEvent, Collection, ResumeToken};
use crate::error::StatsError;

pub use memory::MemoryDocumentStore;
pub use postgres::{PgChangeSource, PgCollections};

/// Lazy, infinite sequence of change notifications for one collection.
///
/// Yields `Err(StatsError::ResumeTokenInvalid)` when events were dropped for
/// this subscriber and `Err(StatsError::Transport)` on transport failure.
/// The stream ends when the source closes the subscription.
pub type ChangeStream = Pin<Box<dyn Stream<Item = Result<ChangeEvent, StatsError>> + Send>>;

/// A data store that emits change notifications per collection.
#[async_trait]
pub trait ChangeSource: Send + Sync + std::fmt::Debug {
    /// Opens a change stream for `collection`.
    ///
    /// With `resume_after = Some(token)` every event after `token` is
    /// replayed before live events.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::ResumeTokenInvalid`] when the source can not
    /// replay from `token`, and [`StatsError::Transport`] when the
    /// subscription can not be established.
    async fn subscribe(
        &self,
        collection: Collection,
        resume_after: Option<ResumeToken>,
    ) -> Result<ChangeStream, StatsError>;
}

/// Full reads of the source collections.
#[async_trait]
pub trait SourceCollections: Send + Sync + std::fmt::Debug {
    /// Returns every document currently in `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Source`] when the read fails.
    async fn list_all(&self, collection: Collection) -> Result<Vec<serde_json::Value>, StatsError>;
}
