use std::collections::HashMap;

use crate::models::{Anonymity, EnrolledUser, JoinRow, RatingKind, UserStats};

/// Source of externally computed reputation scores.
pub trait ReputationLookup {
    fn reputation(&self, user_id: i64) -> i64;
    fn forum_reputation(&self, forum_id: i64, user_id: i64) -> i64;
}

/// Reputation scores loaded up front; unknown users score zero.
#[derive(Debug, Clone, Default)]
pub struct ReputationTable {
    pub course: HashMap<i64, i64>,
    pub forum: HashMap<(i64, i64), i64>,
}

impl ReputationLookup for ReputationTable {
    fn reputation(&self, user_id: i64) -> i64 {
        self.course.get(&user_id).copied().unwrap_or(0)
    }

    fn forum_reputation(&self, forum_id: i64, user_id: i64) -> i64 {
        self.forum.get(&(forum_id, user_id)).copied().unwrap_or(0)
    }
}

/// Folds the join rows into one statistics record per enrolled user.
///
/// Rows owned or rated by users outside `users` are ignored. Every enrolled
/// user gets a record, even with no matching rows. The result does not depend
/// on row order: each post and each rating is counted at most once per user.
pub fn aggregate(
    rows: &[JoinRow],
    users: &[EnrolledUser],
    target_forum_id: i64,
    reputation: &impl ReputationLookup,
) -> HashMap<i64, UserStats> {
    let mut stats: HashMap<i64, UserStats> = users
        .iter()
        .map(|user| (user.id, UserStats::new(user)))
        .collect();

    for row in rows {
        if let Some(owner) = stats.get_mut(&row.post_owner_id) {
            count_received_vote(owner, row);
            count_written_post(owner, row, target_forum_id);
        }

        if let Some(rater) = row.rater_id.and_then(|id| stats.get_mut(&id)) {
            count_submitted_rating(rater, row, target_forum_id);
        }
    }

    for entry in stats.values_mut() {
        entry.reputation = reputation.reputation(entry.user_id);
        entry.forum_reputation = reputation.forum_reputation(target_forum_id, entry.user_id);
    }

    stats
}

fn count_received_vote(owner: &mut UserStats, row: &JoinRow) {
    if !row.author_visible() {
        return;
    }

    match row.rating {
        Some(RatingKind::Upvote) => owner.received_upvotes += 1,
        Some(RatingKind::Downvote) => owner.received_downvotes += 1,
        _ => {}
    }
}

fn count_submitted_rating(rater: &mut UserStats, row: &JoinRow, target_forum_id: i64) {
    let (Some(rating_id), Some(rating)) = (row.rating_id, row.rating) else {
        return;
    };
    if rater.rated_post_ids.contains(&rating_id) {
        return;
    }

    let counts = rating.is_vote()
        || (rating == RatingKind::Solved && row.anonymity != Anonymity::FullAnonymous)
        || (rating == RatingKind::Helpful && row.anonymity == Anonymity::None);
    if !counts {
        return;
    }

    rater.rated_post_ids.insert(rating_id);
    record_activity(rater, row, target_forum_id);
}

fn count_written_post(owner: &mut UserStats, row: &JoinRow, target_forum_id: i64) {
    if owner.submitted_post_ids.contains(&row.post_id) || !row.author_visible() {
        return;
    }

    owner.submitted_post_ids.insert(row.post_id);
    record_activity(owner, row, target_forum_id);
}

fn record_activity(entry: &mut UserStats, row: &JoinRow, target_forum_id: i64) {
    entry.activity += 1;
    if row.forum_instance_id == target_forum_id {
        entry.forum_activity += 1;
    }
}
