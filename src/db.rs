use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::jobs::MailQueue;
use crate::models::{
    Anonymity, DigestEntry, EnrolledUser, JoinRow, MailedStatus, PendingReview, RatingKind,
    Recipient,
};
use crate::stats::ReputationTable;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let users = [
        (1_i64, "Avery", "Lee", "avery.lee@example.edu"),
        (2, "Jules", "Moreno", "jules.moreno@example.edu"),
        (3, "Kiara", "Patel", "kiara.patel@example.edu"),
        (4, "Dana", "Okafor", "dana.okafor@example.edu"),
    ];
    for (id, firstname, lastname, email) in users {
        sqlx::query(
            r#"
            INSERT INTO overflow_insights.users (id, firstname, lastname, email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET firstname = EXCLUDED.firstname, lastname = EXCLUDED.lastname
            "#,
        )
        .bind(id)
        .bind(firstname)
        .bind(lastname)
        .bind(email)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "INSERT INTO overflow_insights.courses (id, fullname) VALUES (1, 'Cell Biology') \
         ON CONFLICT (id) DO NOTHING",
    )
    .execute(pool)
    .await?;

    for user_id in [1_i64, 2, 3, 4] {
        sqlx::query(
            "INSERT INTO overflow_insights.enrolments (course_id, user_id) VALUES (1, $1) \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
    }

    let forums = [(1_i64, "Lecture questions"), (2, "Lab reports")];
    for (id, name) in forums {
        sqlx::query(
            "INSERT INTO overflow_insights.forums (id, course_id, name) VALUES ($1, 1, $2) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let discussions = [
        (1_i64, 1_i64, 1_i64, "Mitosis vs meiosis", Anonymity::None),
        (2, 1, 2, "Exam scope", Anonymity::PartialAnonymous),
        (3, 2, 3, "Microscope calibration", Anonymity::FullAnonymous),
    ];
    for (id, forum_id, user_id, name, anonymity) in discussions {
        sqlx::query(
            r#"
            INSERT INTO overflow_insights.discussions (id, forum_id, user_id, name, anonymity)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(forum_id)
        .bind(user_id)
        .bind(name)
        .bind(anonymity as i16)
        .execute(pool)
        .await?;
    }

    let now = Utc::now();
    let posts = [
        (1_i64, 1_i64, 1_i64, now - Duration::days(3), true),
        (2, 1, 2, now - Duration::days(2), true),
        (3, 2, 2, now - Duration::days(2), true),
        (4, 2, 3, now - Duration::days(1), true),
        (5, 3, 3, now - Duration::days(1), true),
        (6, 3, 4, now - Duration::hours(3), false),
    ];
    for (id, discussion_id, user_id, created_at, reviewed) in posts {
        sqlx::query(
            r#"
            INSERT INTO overflow_insights.posts (id, discussion_id, user_id, created_at, reviewed)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(discussion_id)
        .bind(user_id)
        .bind(created_at)
        .bind(reviewed)
        .execute(pool)
        .await?;
    }

    let ratings = [
        (1_i64, 2_i64, 1_i64, RatingKind::Upvote),
        (2, 2, 3, RatingKind::Upvote),
        (3, 2, 1, RatingKind::Solved),
        (4, 4, 2, RatingKind::Downvote),
        (5, 4, 1, RatingKind::Helpful),
        (6, 5, 4, RatingKind::Solved),
    ];
    for (id, post_id, user_id, rating) in ratings {
        sqlx::query(
            "INSERT INTO overflow_insights.ratings (id, post_id, user_id, rating) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(post_id)
        .bind(user_id)
        .bind(rating as i16)
        .execute(pool)
        .await?;
    }

    for (user_id, score) in [(1_i64, 12_i64), (2, 9), (3, 4), (4, 0)] {
        sqlx::query(
            "INSERT INTO overflow_insights.reputation (course_id, user_id, score) \
             VALUES (1, $1, $2) ON CONFLICT (course_id, user_id) DO UPDATE SET score = EXCLUDED.score",
        )
        .bind(user_id)
        .bind(score)
        .execute(pool)
        .await?;
        sqlx::query(
            "INSERT INTO overflow_insights.forum_reputation (forum_id, user_id, score) \
             VALUES (1, $1, $2) ON CONFLICT (forum_id, user_id) DO UPDATE SET score = EXCLUDED.score",
        )
        .bind(user_id)
        .bind(score / 2)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "INSERT INTO overflow_insights.reviewers (course_id, user_id) VALUES (1, 1) \
         ON CONFLICT DO NOTHING",
    )
    .execute(pool)
    .await?;

    for (user_id, discussion_id, forum_id, unread) in [(3_i64, 1_i64, 1_i64, 2_i64), (4, 2, 1, 1)] {
        sqlx::query(
            r#"
            INSERT INTO overflow_insights.mail_info
            (user_id, course_id, forum_id, discussion_id, unread_posts)
            VALUES ($1, 1, $2, $3, $4)
            ON CONFLICT (user_id, discussion_id) DO UPDATE
            SET unread_posts = EXCLUDED.unread_posts
            "#,
        )
        .bind(user_id)
        .bind(forum_id)
        .bind(discussion_id)
        .bind(unread)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// One row per post/rating combination in the course; unrated posts appear once.
pub async fn fetch_join_rows(pool: &PgPool, course_id: i64) -> anyhow::Result<Vec<JoinRow>> {
    let records = sqlx::query(
        r#"
        SELECT d.id AS discussion_id, d.user_id AS discussion_owner_id, d.anonymity,
               p.id AS post_id, p.user_id AS post_owner_id,
               r.id AS rating_id, r.rating, r.user_id AS rater_id,
               f.id AS forum_id
        FROM overflow_insights.discussions d
        JOIN overflow_insights.forums f ON f.id = d.forum_id
        JOIN overflow_insights.posts p ON p.discussion_id = d.id
        LEFT JOIN overflow_insights.ratings r ON r.post_id = p.id
        WHERE f.course_id = $1
        ORDER BY p.id, r.id
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    records.iter().map(join_row_from_pg).collect()
}

fn join_row_from_pg(row: &PgRow) -> anyhow::Result<JoinRow> {
    let anonymity: i16 = row.get("anonymity");
    let rating: Option<i16> = row.get("rating");

    Ok(JoinRow {
        discussion_id: row.get("discussion_id"),
        discussion_owner_id: row.get("discussion_owner_id"),
        post_id: row.get("post_id"),
        post_owner_id: row.get("post_owner_id"),
        rating_id: row.get("rating_id"),
        rating: rating.map(|value| RatingKind::try_from(i32::from(value))).transpose()?,
        rater_id: row.get("rater_id"),
        anonymity: Anonymity::try_from(i32::from(anonymity))?,
        forum_instance_id: row.get("forum_id"),
    })
}

#[derive(Debug, serde::Deserialize)]
struct CsvJoinRow {
    discussion_id: i64,
    discussion_owner_id: i64,
    post_id: i64,
    post_owner_id: i64,
    rating_id: Option<i64>,
    rating: Option<i32>,
    rater_id: Option<i64>,
    anonymity: i32,
    forum_id: i64,
}

impl TryFrom<CsvJoinRow> for JoinRow {
    type Error = anyhow::Error;

    fn try_from(row: CsvJoinRow) -> Result<Self, Self::Error> {
        Ok(JoinRow {
            discussion_id: row.discussion_id,
            discussion_owner_id: row.discussion_owner_id,
            post_id: row.post_id,
            post_owner_id: row.post_owner_id,
            rating_id: row.rating_id,
            rating: row.rating.map(RatingKind::try_from).transpose()?,
            rater_id: row.rater_id,
            anonymity: Anonymity::try_from(row.anonymity)?,
            forum_instance_id: row.forum_id,
        })
    }
}

/// Reads join rows exported elsewhere, with the same columns as the course query.
pub fn import_rows_csv(csv_path: &std::path::Path) -> anyhow::Result<Vec<JoinRow>> {
    let reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    read_rows_csv(reader)
}

fn read_rows_csv<R: std::io::Read>(mut reader: csv::Reader<R>) -> anyhow::Result<Vec<JoinRow>> {
    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<CsvJoinRow>().enumerate() {
        let record = result.with_context(|| format!("malformed csv record {}", index + 1))?;
        rows.push(JoinRow::try_from(record).with_context(|| format!("csv record {}", index + 1))?);
    }
    Ok(rows)
}

pub async fn fetch_enrolled_users(
    pool: &PgPool,
    course_id: i64,
) -> anyhow::Result<Vec<EnrolledUser>> {
    let records = sqlx::query(
        r#"
        SELECT u.id, u.firstname || ' ' || u.lastname AS display_name
        FROM overflow_insights.users u
        JOIN overflow_insights.enrolments e ON e.user_id = u.id
        WHERE e.course_id = $1 AND e.active
        ORDER BY u.lastname, u.firstname
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    Ok(records
        .into_iter()
        .map(|row| EnrolledUser {
            id: row.get("id"),
            display_name: row.get("display_name"),
        })
        .collect())
}

pub async fn fetch_reputation(
    pool: &PgPool,
    course_id: i64,
    forum_id: i64,
) -> anyhow::Result<ReputationTable> {
    let mut table = ReputationTable::default();

    let course = sqlx::query(
        "SELECT user_id, score FROM overflow_insights.reputation WHERE course_id = $1",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;
    for row in course {
        table.course.insert(row.get("user_id"), row.get("score"));
    }

    let forum = sqlx::query(
        "SELECT user_id, score FROM overflow_insights.forum_reputation WHERE forum_id = $1",
    )
    .bind(forum_id)
    .fetch_all(pool)
    .await?;
    for row in forum {
        table.forum.insert((forum_id, row.get("user_id")), row.get("score"));
    }

    Ok(table)
}

pub struct PgMailQueue {
    pool: PgPool,
}

impl PgMailQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn recipient_from_pg(row: &PgRow) -> Recipient {
    Recipient {
        user_id: row.get("id"),
        display_name: row.get("display_name"),
        email: row.get("email"),
    }
}

#[async_trait]
impl MailQueue for PgMailQueue {
    async fn digest_entries(&self) -> anyhow::Result<Vec<DigestEntry>> {
        let records = sqlx::query(
            r#"
            SELECT m.id, m.user_id, m.course_id, c.fullname AS course_name,
                   m.forum_id, f.name AS forum_name,
                   m.discussion_id, d.name AS discussion_name, m.unread_posts
            FROM overflow_insights.mail_info m
            JOIN overflow_insights.courses c ON c.id = m.course_id
            JOIN overflow_insights.forums f ON f.id = m.forum_id
            JOIN overflow_insights.discussions d ON d.id = m.discussion_id
            ORDER BY m.user_id, m.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records
            .into_iter()
            .map(|row| DigestEntry {
                id: row.get("id"),
                user_id: row.get("user_id"),
                course_id: row.get("course_id"),
                course_name: row.get("course_name"),
                forum_id: row.get("forum_id"),
                forum_name: row.get("forum_name"),
                discussion_id: row.get("discussion_id"),
                discussion_name: row.get("discussion_name"),
                unread_posts: row.get("unread_posts"),
            })
            .collect())
    }

    async fn recipient(&self, user_id: i64) -> anyhow::Result<Option<Recipient>> {
        let row = sqlx::query(
            "SELECT id, firstname || ' ' || lastname AS display_name, email \
             FROM overflow_insights.users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(recipient_from_pg))
    }

    async fn delete_digest_entries(&self, ids: &[i64]) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM overflow_insights.mail_info WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pending_reviews(
        &self,
        older_than: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PendingReview>> {
        let records = sqlx::query(
            r#"
            SELECT p.id AS post_id, p.created_at,
                   d.id AS discussion_id, d.name AS discussion_name,
                   f.id AS forum_id, f.name AS forum_name,
                   c.id AS course_id, c.fullname AS course_name,
                   u.firstname || ' ' || u.lastname AS author_name
            FROM overflow_insights.posts p
            JOIN overflow_insights.discussions d ON d.id = p.discussion_id
            JOIN overflow_insights.forums f ON f.id = d.forum_id
            JOIN overflow_insights.courses c ON c.id = f.course_id
            JOIN overflow_insights.users u ON u.id = p.user_id
            WHERE p.reviewed = FALSE AND p.mailed = $1 AND p.created_at <= $2
            ORDER BY p.created_at, p.id
            "#,
        )
        .bind(MailedStatus::Pending.as_i32() as i16)
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        Ok(records
            .into_iter()
            .map(|row| PendingReview {
                post_id: row.get("post_id"),
                discussion_id: row.get("discussion_id"),
                discussion_name: row.get("discussion_name"),
                forum_id: row.get("forum_id"),
                forum_name: row.get("forum_name"),
                course_id: row.get("course_id"),
                course_name: row.get("course_name"),
                author_name: row.get("author_name"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn reviewers(&self, course_id: i64) -> anyhow::Result<Vec<Recipient>> {
        let records = sqlx::query(
            r#"
            SELECT u.id, u.firstname || ' ' || u.lastname AS display_name, u.email
            FROM overflow_insights.reviewers r
            JOIN overflow_insights.users u ON u.id = r.user_id
            WHERE r.course_id = $1
            ORDER BY u.id
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.iter().map(recipient_from_pg).collect())
    }

    async fn set_mailed(&self, post_id: i64, status: MailedStatus) -> anyhow::Result<()> {
        sqlx::query("UPDATE overflow_insights.posts SET mailed = $2 WHERE id = $1")
            .bind(post_id)
            .bind(status.as_i32() as i16)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(data: &str) -> csv::Reader<&[u8]> {
        csv::Reader::from_reader(data.as_bytes())
    }

    #[test]
    fn reads_rated_and_unrated_rows() {
        let data = "\
discussion_id,discussion_owner_id,post_id,post_owner_id,rating_id,rating,rater_id,anonymity,forum_id
1,1,10,2,100,2,3,0,7
1,1,11,1,,,,1,7
";
        let rows = read_rows_csv(reader(data)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rating, Some(RatingKind::Upvote));
        assert_eq!(rows[0].rater_id, Some(3));
        assert_eq!(rows[1].rating_id, None);
        assert_eq!(rows[1].rating, None);
        assert_eq!(rows[1].anonymity, Anonymity::PartialAnonymous);
        assert_eq!(rows[1].forum_instance_id, 7);
    }

    #[test]
    fn rejects_unknown_rating_values() {
        let data = "\
discussion_id,discussion_owner_id,post_id,post_owner_id,rating_id,rating,rater_id,anonymity,forum_id
1,1,10,2,100,9,3,0,7
";
        let err = read_rows_csv(reader(data)).unwrap_err();
        assert!(format!("{err:#}").contains("unknown rating value 9"));
    }
}
