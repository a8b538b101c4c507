//! Service layer: metric recomputation, listener supervision and reads.
//!
//! [`RecomputeEngine`] owns every snapshot write, [`ListenerSupervisor`]
//! drives it from the change feeds, and [`StatsService`] serves reads.
//! Events go out through the [`super::domain::EventBus`].

pub mod backoff;
pub mod dashboard;
pub mod health;
pub mod recompute;
pub mod stats_service;
pub mod supervisor;

pub use backoff::Backoff;
pub use dashboard::{DASHBOARD_WINDOW, DashboardPoint, DashboardStats, MetricTrend};
pub use health::{HealthRegistry, ListenerHealth};
pub use recompute::{RecomputeEngine, SeedOutcome};
pub use stats_service::{MAX_HISTORY_LIMIT, StatsService};
pub use supervisor::{ListenerSupervisor, SupervisorConfig, SupervisorHandle};
