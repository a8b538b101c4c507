//! Source document shapes read by the recompute handlers.
//!
//! Documents arrive untyped (`serde_json::Value`); only the fields needed
//! for aggregation are decoded. Everything else in a document is ignored.

use serde::{Deserialize, Serialize};

/// A content catalog item as seen by the aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Monotonic view counter. Missing counters read as zero.
    #[serde(default)]
    pub views: u64,
}

/// Subscription status of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription created at the payment gateway, not yet paid.
    Created,
    /// Paid and running.
    Active,
    /// Cancelled by the user or an administrator.
    Cancelled,
    /// Any other gateway status.
    #[serde(other)]
    Other,
}

/// Subscription sub-document of a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Payment gateway subscription id.
    #[serde(default)]
    pub id: Option<String>,
    /// Current status; absent when the user never subscribed.
    #[serde(default)]
    pub status: Option<SubscriptionStatus>,
}

/// A user account as seen by the aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Subscription details, if any.
    #[serde(default)]
    pub subscription: Option<SubscriptionInfo>,
}

impl UserRecord {
    /// Returns `true` when the account's subscription status is `active`.
    #[must_use]
    pub fn is_active_subscriber(&self) -> bool {
        matches!(
            self.subscription,
            Some(SubscriptionInfo {
                status: Some(SubscriptionStatus::Active),
                ..
            })
        )
    }
}

/// Metrics derived from the user collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserMetrics {
    /// Accounts with an active subscription.
    pub subscriptions: u64,
    /// All accounts.
    pub users: u64,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_without_counter_reads_zero() {
        let record: Result<ContentRecord, _> = serde_json::from_value(json!({"title": "Rust"}));
        assert_eq!(record.ok().map(|r| r.views), Some(0));
    }

    #[test]
    fn negative_counter_is_rejected() {
        let record: Result<ContentRecord, _> = serde_json::from_value(json!({"views": -4}));
        assert!(record.is_err());
    }

    #[test]
    fn active_subscriber_detection() {
        let active: Result<UserRecord, _> =
            serde_json::from_value(json!({"subscription": {"id": "sub_1", "status": "active"}}));
        let cancelled: Result<UserRecord, _> =
            serde_json::from_value(json!({"subscription": {"status": "cancelled"}}));
        let never: Result<UserRecord, _> = serde_json::from_value(json!({"name": "ada"}));
        assert_eq!(active.map(|u| u.is_active_subscriber()).ok(), Some(true));
        assert_eq!(cancelled.map(|u| u.is_active_subscriber()).ok(), Some(false));
        assert_eq!(never.map(|u| u.is_active_subscriber()).ok(), Some(false));
    }

    #[test]
    fn unknown_status_is_not_active() {
        let record: Result<UserRecord, _> =
            serde_json::from_value(json!({"subscription": {"status": "halted"}}));
        let Ok(record) = record else {
            panic!("unknown status should still decode");
        };
        assert!(!record.is_active_subscriber());
    }
}
