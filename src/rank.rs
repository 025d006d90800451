use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::StatsError;
use crate::models::UserStats;

/// Statistics table columns that can drive the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Username,
    ReceivedUpvotes,
    ReceivedDownvotes,
    ForumActivity,
    Activity,
    ForumReputation,
    Reputation,
}

impl SortKey {
    pub const ALL: [SortKey; 7] = [
        SortKey::Username,
        SortKey::ReceivedUpvotes,
        SortKey::ReceivedDownvotes,
        SortKey::ForumActivity,
        SortKey::Activity,
        SortKey::ForumReputation,
        SortKey::Reputation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Username => "username",
            SortKey::ReceivedUpvotes => "receivedupvotes",
            SortKey::ReceivedDownvotes => "receiveddownvotes",
            SortKey::ForumActivity => "forumactivity",
            SortKey::Activity => "activity",
            SortKey::ForumReputation => "forumreputation",
            SortKey::Reputation => "reputation",
        }
    }

    /// The table does not offer sorting on the name column.
    pub fn is_sortable(self) -> bool {
        self != SortKey::Username
    }
}

impl FromStr for SortKey {
    type Err = StatsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        SortKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| StatsError::InvalidArgument(format!("unknown sort key '{value}'")))
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl FromStr for Direction {
    type Err = StatsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Direction::Ascending),
            "desc" | "descending" => Ok(Direction::Descending),
            other => Err(StatsError::InvalidArgument(format!(
                "unknown sort direction '{other}'"
            ))),
        }
    }
}

/// Orders the records by `key`.
///
/// The sort is unstable: records with equal keys may come out in any
/// relative order. `Reputation` compares the decimal text of the score, not
/// the number, so `10` sorts before `9` ascending.
pub fn rank(mut stats: Vec<UserStats>, key: SortKey, direction: Direction) -> Vec<UserStats> {
    stats.sort_unstable_by(|a, b| {
        let ordering = compare(a, b, key);
        match direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    });
    stats
}

fn compare(a: &UserStats, b: &UserStats, key: SortKey) -> Ordering {
    match key {
        SortKey::Username => a.display_name.cmp(&b.display_name),
        SortKey::ReceivedUpvotes => a.received_upvotes.cmp(&b.received_upvotes),
        SortKey::ReceivedDownvotes => a.received_downvotes.cmp(&b.received_downvotes),
        SortKey::ForumActivity => a.forum_activity.cmp(&b.forum_activity),
        SortKey::Activity => a.activity.cmp(&b.activity),
        SortKey::ForumReputation => a.forum_reputation.cmp(&b.forum_reputation),
        SortKey::Reputation => a.reputation.to_string().cmp(&b.reputation.to_string()),
    }
}
