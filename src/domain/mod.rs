//! Domain layer: snapshot model, change events, and the engine event bus.
//!
//! This module contains the aggregate statistics record, the change
//! notifications consumed from the source collections, the decoded source
//! record shapes, and the broadcast bus for engine events.

pub mod change_event;
pub mod collection;
pub mod event_bus;
pub mod listener_state;
pub mod records;
pub mod snapshot_id;
pub mod stats_event;
pub mod stats_snapshot;

pub use change_event::{ChangeEvent, OperationKind, ResumeToken};
pub use collection::Collection;
pub use event_bus::EventBus;
pub use listener_state::ListenerState;
pub use records::{ContentRecord, SubscriptionInfo, SubscriptionStatus, UserMetrics, UserRecord};
pub use snapshot_id::SnapshotId;
pub use stats_event::{EventTopic, StatsEvent};
pub use stats_snapshot::{SnapshotPatch, StatsSnapshot, UpdateOutcome};
