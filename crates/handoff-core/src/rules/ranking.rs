use crate::domain::SessionStatus;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Exclusive partitions of the session list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewFilter {
    #[default]
    Active,
    NeedsAgent,
    Archived,
    Blocked,
}

impl ViewFilter {
    pub const ALL: [ViewFilter; 4] = [
        ViewFilter::Active,
        ViewFilter::NeedsAgent,
        ViewFilter::Archived,
        ViewFilter::Blocked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ViewFilter::Active => "active",
            ViewFilter::NeedsAgent => "needs-agent",
            ViewFilter::Archived => "archived",
            ViewFilter::Blocked => "blocked",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ViewFilter::Active => "Active",
            ViewFilter::NeedsAgent => "Needs agent",
            ViewFilter::Archived => "Archived",
            ViewFilter::Blocked => "Blocked",
        }
    }

    /// Sessions with no known status yet are treated as active.
    pub fn for_status(status: Option<SessionStatus>) -> ViewFilter {
        match status {
            None | Some(SessionStatus::BotActive) | Some(SessionStatus::AgentActive) => {
                ViewFilter::Active
            }
            Some(SessionStatus::NeedsAgent) => ViewFilter::NeedsAgent,
            Some(SessionStatus::Archived) => ViewFilter::Archived,
            Some(SessionStatus::Blocked) => ViewFilter::Blocked,
        }
    }

    pub fn contains(self, status: Option<SessionStatus>) -> bool {
        Self::for_status(status) == self
    }

    pub fn pins_first(self) -> bool {
        matches!(self, ViewFilter::Active | ViewFilter::NeedsAgent)
    }

    pub fn counts_unread(self) -> bool {
        self != ViewFilter::Blocked
    }

    pub fn next(self) -> ViewFilter {
        let idx = Self::ALL.iter().position(|view| *view == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> ViewFilter {
        let idx = Self::ALL.iter().position(|view| *view == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl fmt::Display for ViewFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewFilter {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "active" => Ok(ViewFilter::Active),
            "needs-agent" => Ok(ViewFilter::NeedsAgent),
            "archived" => Ok(ViewFilter::Archived),
            "blocked" => Ok(ViewFilter::Blocked),
            _ => Err(CoreError::InvalidViewFilter(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RankKey {
    pub pinned: bool,
    pub unread: bool,
    pub last_activity: Option<i64>,
}

/// Stable sort: pinned first where the view honours pins, then unread where the view
/// counts unread, then most recent activity.
pub fn rank_sessions<T>(view: ViewFilter, items: Vec<(T, RankKey)>) -> Vec<T> {
    let mut items = items;
    items.sort_by(|(_, a), (_, b)| compare(view, a, b));
    items.into_iter().map(|(item, _)| item).collect()
}

fn compare(view: ViewFilter, a: &RankKey, b: &RankKey) -> Ordering {
    let pinned = if view.pins_first() {
        b.pinned.cmp(&a.pinned)
    } else {
        Ordering::Equal
    };
    let unread = if view.counts_unread() {
        b.unread.cmp(&a.unread)
    } else {
        Ordering::Equal
    };
    pinned
        .then(unread)
        .then_with(|| b.last_activity.cmp(&a.last_activity))
}
