//! Admin dashboard figures derived from the snapshot history.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::StatsSnapshot;

/// Number of snapshots shown on the dashboard.
pub const DASHBOARD_WINDOW: usize = 12;

/// One entry of the dashboard series. Padding entries carry zeros and no
/// timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DashboardPoint {
    /// Snapshot time, `None` for padding.
    pub created_at: Option<DateTime<Utc>>,
    /// Total course views.
    pub views: u64,
    /// Active subscriptions.
    pub subscriptions: u64,
    /// Registered users.
    pub users: u64,
}

impl DashboardPoint {
    const fn padding() -> Self {
        Self {
            created_at: None,
            views: 0,
            subscriptions: 0,
            users: 0,
        }
    }
}

impl From<&StatsSnapshot> for DashboardPoint {
    fn from(snapshot: &StatsSnapshot) -> Self {
        Self {
            created_at: Some(snapshot.created_at),
            views: snapshot.views,
            subscriptions: snapshot.subscriptions,
            users: snapshot.users,
        }
    }
}

/// Latest value of a metric and its change against the previous entry.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MetricTrend {
    /// Latest value.
    pub current: u64,
    /// Change in percent.
    pub percentage: f64,
    /// `true` when the change is not negative.
    pub profit: bool,
}

impl MetricTrend {
    fn between(previous: u64, current: u64) -> Self {
        let percentage = percentage_change(previous, current);
        Self {
            current,
            percentage,
            profit: percentage >= 0.0,
        }
    }
}

/// Dashboard payload.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DashboardStats {
    /// The last [`DASHBOARD_WINDOW`] snapshots, oldest first.
    pub stats: Vec<DashboardPoint>,
    /// Registered users.
    pub users: MetricTrend,
    /// Active subscriptions.
    pub subscriptions: MetricTrend,
    /// Total course views.
    pub views: MetricTrend,
}

impl DashboardStats {
    /// Builds the dashboard from history ordered newest first.
    ///
    /// Only the first [`DASHBOARD_WINDOW`] entries are used; a shorter
    /// history is padded at the front with zero entries.
    #[must_use]
    pub fn from_history(newest_first: &[StatsSnapshot]) -> Self {
        let recent: Vec<DashboardPoint> = newest_first
            .iter()
            .take(DASHBOARD_WINDOW)
            .rev()
            .map(DashboardPoint::from)
            .collect();

        let mut stats =
            vec![DashboardPoint::padding(); DASHBOARD_WINDOW.saturating_sub(recent.len())];
        stats.extend(recent);

        let zero = DashboardPoint::padding();
        let latest = stats.last().unwrap_or(&zero);
        let previous = stats.iter().rev().nth(1).unwrap_or(&zero);

        Self {
            users: MetricTrend::between(previous.users, latest.users),
            subscriptions: MetricTrend::between(previous.subscriptions, latest.subscriptions),
            views: MetricTrend::between(previous.views, latest.views),
            stats,
        }
    }
}

/// Percentage change from `previous` to `current`.
///
/// A zero baseline reports `current * 100`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percentage_change(previous: u64, current: u64) -> f64 {
    let current = current as f64;
    if previous == 0 {
        current * 100.0
    } else {
        let previous = previous as f64;
        (current - previous) / previous * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn history(values: &[(u64, u64, u64)]) -> Vec<StatsSnapshot> {
        let start = Utc::now();
        let mut snapshots: Vec<StatsSnapshot> = values
            .iter()
            .zip(0_i64..)
            .map(|(&(views, subscriptions, users), i)| {
                let mut s = StatsSnapshot::new(views, subscriptions, users);
                s.created_at = start + Duration::days(i);
                s
            })
            .collect();
        snapshots.reverse();
        snapshots
    }

    #[test]
    fn percentage_from_zero_baseline() {
        assert!((percentage_change(0, 3) - 300.0).abs() < f64::EPSILON);
        assert!(percentage_change(0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn percentage_relative_change() {
        assert!((percentage_change(40, 50) - 25.0).abs() < f64::EPSILON);
        assert!((percentage_change(50, 40) + 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn short_history_is_front_padded() {
        let dashboard = DashboardStats::from_history(&history(&[(10, 1, 20), (15, 2, 40)]));
        assert_eq!(dashboard.stats.len(), DASHBOARD_WINDOW);
        assert!(dashboard.stats.iter().take(10).all(|p| p.created_at.is_none()));
        assert_eq!(dashboard.stats.last().map(|p| p.views), Some(15));

        assert_eq!(dashboard.users.current, 40);
        assert!((dashboard.users.percentage - 100.0).abs() < f64::EPSILON);
        assert!(dashboard.views.profit);
    }

    #[test]
    fn decline_is_not_profit() {
        let dashboard = DashboardStats::from_history(&history(&[(20, 4, 10), (10, 4, 10)]));
        assert!(!dashboard.views.profit);
        assert!((dashboard.views.percentage + 50.0).abs() < f64::EPSILON);
        assert!(dashboard.subscriptions.profit);
    }

    #[test]
    fn only_last_window_is_used() {
        let values: Vec<(u64, u64, u64)> = (0..20).map(|i| (i, i, i)).collect();
        let dashboard = DashboardStats::from_history(&history(&values));
        let views: Vec<u64> = dashboard.stats.iter().map(|p| p.views).collect();
        assert_eq!(views, (8..20).collect::<Vec<u64>>());
    }

    #[test]
    fn empty_history_is_all_zero() {
        let dashboard = DashboardStats::from_history(&[]);
        assert_eq!(dashboard.stats.len(), DASHBOARD_WINDOW);
        assert_eq!(dashboard.views.current, 0);
        assert!(dashboard.views.profit);
    }
}
