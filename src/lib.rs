//! # stats-engine
//!
//! Real-time aggregate statistics for an e-learning platform backend.
//!
//! The engine keeps three platform-wide metrics (total course views,
//! active subscriptions and registered users) in a time-ordered series of
//! snapshots. It watches the course catalog and the user accounts for
//! changes and, after every change, re-derives the affected metrics from a
//! full read of the collection. Deltas are never applied, so a missed or
//! duplicated event heals on the next recomputation.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── StatsService (service/)         reads
//!     ├── EventBus (domain/)              snapshot + listener events
//!     │
//!     ├── ListenerSupervisor (service/)   one task per collection
//!     ├── RecomputeEngine (service/)      serialized read-compute-CAS
//!     │
//!     ├── ChangeSource / SourceCollections (source/)
//!     └── SnapshotStore (persistence/)    PostgreSQL or in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod source;
pub mod ws;
