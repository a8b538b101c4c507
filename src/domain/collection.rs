//! Watched source collections.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A source collection whose changes feed the aggregate snapshot.
///
/// Each collection owns a disjoint set of snapshot fields: the content
/// catalog owns `views`; the user accounts own `subscriptions` and `users`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// The course catalog (per-item view counters).
    Content,
    /// User accounts (existence and subscription status).
    Users,
}

impl Collection {
    /// Every watched collection, in listener start order.
    pub const ALL: [Self; 2] = [Self::Content, Self::Users];

    /// Stable lowercase name used in logs, events and URLs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Users => "users",
        }
    }

    /// Backing table in the document database.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Content => "courses",
            Self::Users => "users",
        }
    }

    /// PostgreSQL NOTIFY channel carrying this collection's changes.
    #[must_use]
    pub const fn channel(&self) -> &'static str {
        match self {
            Self::Content => "course_changes",
            Self::Users => "user_changes",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" | "courses" => Ok(Self::Content),
            "users" => Ok(Self::Users),
            other => Err(format!("unknown collection: {other}")),
        }
    }
}
