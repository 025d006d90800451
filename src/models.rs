use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StatsError;

/// Rating values as stored in the ratings table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingKind {
    Downvote = 1,
    Upvote = 2,
    Solved = 3,
    Helpful = 4,
}

impl RatingKind {
    pub fn is_vote(self) -> bool {
        matches!(self, RatingKind::Upvote | RatingKind::Downvote)
    }
}

impl TryFrom<i32> for RatingKind {
    type Error = StatsError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RatingKind::Downvote),
            2 => Ok(RatingKind::Upvote),
            3 => Ok(RatingKind::Solved),
            4 => Ok(RatingKind::Helpful),
            other => Err(StatsError::InvalidArgument(format!(
                "unknown rating value {other}"
            ))),
        }
    }
}

/// Per-discussion anonymity. `PartialAnonymous` hides only the discussion starter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anonymity {
    None = 0,
    PartialAnonymous = 1,
    FullAnonymous = 2,
}

impl TryFrom<i32> for Anonymity {
    type Error = StatsError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Anonymity::None),
            1 => Ok(Anonymity::PartialAnonymous),
            2 => Ok(Anonymity::FullAnonymous),
            other => Err(StatsError::InvalidArgument(format!(
                "unknown anonymity setting {other}"
            ))),
        }
    }
}

/// One post/rating combination from the flattened forum join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRow {
    pub discussion_id: i64,
    pub discussion_owner_id: i64,
    pub post_id: i64,
    pub post_owner_id: i64,
    pub rating_id: Option<i64>,
    pub rating: Option<RatingKind>,
    pub rater_id: Option<i64>,
    pub anonymity: Anonymity,
    pub forum_instance_id: i64,
}

impl JoinRow {
    /// Whether the post author's identity may be attributed for this row.
    pub fn author_visible(&self) -> bool {
        match self.anonymity {
            Anonymity::None => true,
            Anonymity::PartialAnonymous => self.post_owner_id != self.discussion_owner_id,
            Anonymity::FullAnonymous => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrolledUser {
    pub id: i64,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserStats {
    pub user_id: i64,
    pub display_name: String,
    pub received_upvotes: u32,
    pub received_downvotes: u32,
    pub forum_activity: u32,
    pub activity: u32,
    pub forum_reputation: i64,
    pub reputation: i64,
    #[serde(skip)]
    pub submitted_post_ids: HashSet<i64>,
    /// Rating ids, despite the name: one entry per counted rating.
    #[serde(skip)]
    pub rated_post_ids: HashSet<i64>,
}

impl UserStats {
    pub fn new(user: &EnrolledUser) -> Self {
        Self {
            user_id: user.id,
            display_name: user.display_name.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub course_name: String,
    pub forum_id: i64,
    pub forum_name: String,
    pub discussion_id: i64,
    pub discussion_name: String,
    pub unread_posts: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: i64,
    pub display_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReview {
    pub post_id: i64,
    pub discussion_id: i64,
    pub discussion_name: String,
    pub forum_id: i64,
    pub forum_name: String,
    pub course_id: i64,
    pub course_name: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

/// Value of the `mailed` column on posts. `1` marks a regular post mailing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailedStatus {
    Pending = 0,
    ReviewSuccess = 2,
    ReviewFailure = 3,
}

impl MailedStatus {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
