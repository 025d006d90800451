use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::config::MailSettings;
use crate::digest::{self, MailBody};
use crate::error::JobError;
use crate::mail::{MailTransport, OutgoingMail};
use crate::models::{DigestEntry, MailedStatus, PendingReview, Recipient};

/// Persistence used by the scheduled mail jobs.
#[async_trait]
pub trait MailQueue: Send + Sync {
    async fn digest_entries(&self) -> anyhow::Result<Vec<DigestEntry>>;
    async fn recipient(&self, user_id: i64) -> anyhow::Result<Option<Recipient>>;
    async fn delete_digest_entries(&self, ids: &[i64]) -> anyhow::Result<()>;
    async fn pending_reviews(&self, older_than: DateTime<Utc>)
        -> anyhow::Result<Vec<PendingReview>>;
    async fn reviewers(&self, course_id: i64) -> anyhow::Result<Vec<Recipient>>;
    async fn set_mailed(&self, post_id: i64, status: MailedStatus) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Mails every user their unread digest and removes the delivered records.
///
/// A failed delivery keeps that user's records for the next run and does not
/// stop the batch. Store errors abort the run.
pub async fn send_digests(
    queue: &dyn MailQueue,
    transport: &dyn MailTransport,
    settings: &MailSettings,
) -> anyhow::Result<JobSummary> {
    let mut by_user: BTreeMap<i64, Vec<DigestEntry>> = BTreeMap::new();
    for entry in queue.digest_entries().await? {
        by_user.entry(entry.user_id).or_default().push(entry);
    }

    let mut summary = JobSummary::default();
    for (user_id, entries) in by_user {
        let ids: Vec<i64> = entries.iter().map(|entry| entry.id).collect();

        let Some(recipient) = queue.recipient(user_id).await? else {
            tracing::warn!(user_id, "dropping digest records for unknown user");
            queue.delete_digest_entries(&ids).await?;
            summary.skipped += 1;
            continue;
        };
        if recipient.email.trim().is_empty() {
            tracing::warn!(user_id, "dropping digest records for user without email");
            queue.delete_digest_entries(&ids).await?;
            summary.skipped += 1;
            continue;
        }

        let body = digest::format_digest(&settings.site_url, &recipient, &entries);
        match deliver(transport, settings, &recipient, body).await {
            Ok(()) => {
                queue.delete_digest_entries(&ids).await?;
                summary.sent += 1;
            }
            Err(err) => {
                tracing::warn!(user_id, error = %err, "digest mail failed, keeping records");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        sent = summary.sent,
        failed = summary.failed,
        skipped = summary.skipped,
        "digest run finished"
    );
    Ok(summary)
}

/// Reminds the course reviewers about posts that have waited longer than the
/// configured delay, then records the outcome on each post.
pub async fn send_review_reminders(
    queue: &dyn MailQueue,
    transport: &dyn MailTransport,
    settings: &MailSettings,
) -> anyhow::Result<JobSummary> {
    let cutoff = review_cutoff(Utc::now(), settings.review_delay_minutes)?;
    let reviews = queue.pending_reviews(cutoff).await?;

    let mut summary = JobSummary::default();
    for review in reviews {
        let reviewers = queue.reviewers(review.course_id).await?;
        if reviewers.is_empty() {
            tracing::warn!(
                post_id = review.post_id,
                course_id = review.course_id,
                "no reviewers for course"
            );
            queue
                .set_mailed(review.post_id, MailedStatus::ReviewFailure)
                .await?;
            summary.skipped += 1;
            continue;
        }

        let mut delivered = 0usize;
        for reviewer in &reviewers {
            let body = digest::format_review_request(&settings.site_url, reviewer, &review);
            match deliver(transport, settings, reviewer, body).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::warn!(
                        post_id = review.post_id,
                        user_id = reviewer.user_id,
                        error = %err,
                        "review reminder failed"
                    );
                    summary.failed += 1;
                }
            }
        }
        summary.sent += delivered;

        let status = if delivered > 0 {
            MailedStatus::ReviewSuccess
        } else {
            MailedStatus::ReviewFailure
        };
        queue.set_mailed(review.post_id, status).await?;
    }

    tracing::info!(
        sent = summary.sent,
        failed = summary.failed,
        skipped = summary.skipped,
        "review reminder run finished"
    );
    Ok(summary)
}

fn review_cutoff(now: DateTime<Utc>, delay_minutes: i64) -> anyhow::Result<DateTime<Utc>> {
    Duration::try_minutes(delay_minutes.max(0))
        .and_then(|delay| now.checked_sub_signed(delay))
        .ok_or_else(|| anyhow::anyhow!("review delay of {delay_minutes} minutes is out of range"))
}

async fn deliver(
    transport: &dyn MailTransport,
    settings: &MailSettings,
    recipient: &Recipient,
    body: MailBody,
) -> Result<(), JobError> {
    if recipient.email.trim().is_empty() {
        return Err(JobError::MissingEmail(recipient.user_id));
    }

    let mail = OutgoingMail {
        to: recipient.email.clone(),
        from: settings.from.clone(),
        subject: body.subject,
        body_text: body.text,
        body_html: body.html,
    };
    transport.send(&mail).await?;
    Ok(())
}
