use std::fmt::Write;

use crate::models::{DigestEntry, PendingReview, Recipient};

/// Rendered subject plus the two alternative bodies of a mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailBody {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub fn course_url(site_url: &str, course_id: i64) -> String {
    format!("{site_url}/course/view.php?id={course_id}")
}

pub fn forum_url(site_url: &str, forum_id: i64) -> String {
    format!("{site_url}/mod/moodleoverflow/view.php?m={forum_id}")
}

pub fn discussion_url(site_url: &str, discussion_id: i64) -> String {
    format!("{site_url}/mod/moodleoverflow/discussion.php?d={discussion_id}")
}

fn unread_label(count: i64) -> String {
    if count == 1 {
        "1 unread post".to_string()
    } else {
        format!("{count} unread posts")
    }
}

/// Formats one user's unread digest, grouped by course and forum.
pub fn format_digest(site_url: &str, recipient: &Recipient, entries: &[DigestEntry]) -> MailBody {
    let mut sorted: Vec<&DigestEntry> = entries.iter().collect();
    sorted.sort_by_key(|entry| (entry.course_id, entry.forum_id, entry.discussion_id));

    let total: i64 = sorted.iter().map(|entry| entry.unread_posts).sum();
    let subject = format!("Forum digest: {}", unread_label(total));

    let mut text = String::new();
    let mut html = String::new();

    let _ = writeln!(text, "Hello {},", recipient.display_name);
    let _ = writeln!(text);
    let _ = writeln!(text, "There are new posts in discussions you follow:");
    let _ = writeln!(text);

    let _ = writeln!(html, "<p>Hello {},</p>", escape_html(&recipient.display_name));
    let _ = writeln!(html, "<p>There are new posts in discussions you follow:</p>");
    let _ = writeln!(html, "<ul>");

    let mut current_course = None;
    let mut current_forum = None;
    for entry in sorted {
        if current_course != Some(entry.course_id) {
            if current_course.is_some() {
                let _ = writeln!(html, "</ul></li></ul></li>");
            }
            let _ = writeln!(
                html,
                "<li><a href=\"{}\">{}</a><ul>",
                course_url(site_url, entry.course_id),
                escape_html(&entry.course_name)
            );
            current_course = Some(entry.course_id);
            current_forum = None;
        }
        if current_forum != Some(entry.forum_id) {
            if current_forum.is_some() {
                let _ = writeln!(html, "</ul></li>");
            }
            let _ = writeln!(
                html,
                "<li><a href=\"{}\">{}</a><ul>",
                forum_url(site_url, entry.forum_id),
                escape_html(&entry.forum_name)
            );
            current_forum = Some(entry.forum_id);
        }

        let link = discussion_url(site_url, entry.discussion_id);
        let _ = writeln!(
            text,
            "Course: {} -> Forum: {} -> Discussion: {}: {}",
            entry.course_name,
            entry.forum_name,
            entry.discussion_name,
            unread_label(entry.unread_posts)
        );
        let _ = writeln!(text, "  {link}");
        let _ = writeln!(
            html,
            "<li><a href=\"{}\">{}</a>: {}</li>",
            link,
            escape_html(&entry.discussion_name),
            unread_label(entry.unread_posts)
        );
    }
    if current_course.is_some() {
        let _ = writeln!(html, "</ul></li></ul></li>");
    }
    let _ = writeln!(html, "</ul>");

    MailBody {
        subject,
        text,
        html,
    }
}

/// Formats the reminder sent to a reviewer for one post awaiting review.
pub fn format_review_request(
    site_url: &str,
    reviewer: &Recipient,
    review: &PendingReview,
) -> MailBody {
    let link = format!(
        "{}#p{}",
        discussion_url(site_url, review.discussion_id),
        review.post_id
    );
    let submitted = review.created_at.format("%Y-%m-%d %H:%M UTC");
    let subject = format!("Post awaiting review in {}", review.forum_name);

    let mut text = String::new();
    let _ = writeln!(text, "Hello {},", reviewer.display_name);
    let _ = writeln!(text);
    let _ = writeln!(
        text,
        "{} posted in \"{}\" ({} / {}) on {}. The post is waiting for review.",
        review.author_name, review.discussion_name, review.course_name, review.forum_name, submitted
    );
    let _ = writeln!(text);
    let _ = writeln!(text, "Review it here: {link}");

    let mut html = String::new();
    let _ = writeln!(html, "<p>Hello {},</p>", escape_html(&reviewer.display_name));
    let _ = writeln!(
        html,
        "<p>{} posted in <a href=\"{}\">{}</a> ({} / <a href=\"{}\">{}</a>) on {}. The post is waiting for review.</p>",
        escape_html(&review.author_name),
        link,
        escape_html(&review.discussion_name),
        escape_html(&review.course_name),
        forum_url(site_url, review.forum_id),
        escape_html(&review.forum_name),
        submitted
    );

    MailBody {
        subject,
        text,
        html,
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SITE: &str = "https://lms.example.edu";

    fn recipient() -> Recipient {
        Recipient {
            user_id: 1,
            display_name: "Avery Lee".to_string(),
            email: "avery.lee@example.edu".to_string(),
        }
    }

    fn entry(id: i64, course: i64, forum: i64, discussion: i64, unread: i64) -> DigestEntry {
        DigestEntry {
            id,
            user_id: 1,
            course_id: course,
            course_name: format!("Course {course}"),
            forum_id: forum,
            forum_name: format!("Forum {forum}"),
            discussion_id: discussion,
            discussion_name: format!("Discussion {discussion}"),
            unread_posts: unread,
        }
    }

    #[test]
    fn digest_lists_each_discussion_with_links() {
        let entries = vec![entry(2, 1, 4, 9, 1), entry(1, 1, 3, 5, 2)];
        let body = format_digest(SITE, &recipient(), &entries);

        assert_eq!(body.subject, "Forum digest: 3 unread posts");
        let lines: Vec<&str> = body
            .text
            .lines()
            .filter(|line| line.starts_with("Course:"))
            .collect();
        assert_eq!(
            lines,
            vec![
                "Course: Course 1 -> Forum: Forum 3 -> Discussion: Discussion 5: 2 unread posts",
                "Course: Course 1 -> Forum: Forum 4 -> Discussion: Discussion 9: 1 unread post",
            ]
        );
        assert!(body
            .text
            .contains("https://lms.example.edu/mod/moodleoverflow/discussion.php?d=5"));
        assert!(body.html.contains("course/view.php?id=1"));
        assert!(body.html.contains("mod/moodleoverflow/view.php?m=4"));
        assert_eq!(body.html.matches("<ul>").count(), body.html.matches("</ul>").count());
    }

    #[test]
    fn digest_html_escapes_names() {
        let mut tricky = entry(1, 1, 3, 5, 1);
        tricky.discussion_name = "<script>alert('x')</script>".to_string();
        let body = format_digest(SITE, &recipient(), &[tricky]);
        assert!(!body.html.contains("<script>"));
        assert!(body.html.contains("&lt;script&gt;alert(&#39;x&#39;)"));
    }

    #[test]
    fn review_request_links_to_the_post() {
        let review = PendingReview {
            post_id: 77,
            discussion_id: 5,
            discussion_name: "Exam prep".to_string(),
            forum_id: 3,
            forum_name: "Q&A".to_string(),
            course_id: 1,
            course_name: "Biology".to_string(),
            author_name: "Jules Moreno".to_string(),
            created_at: chrono::Utc.with_ymd_and_hms(2026, 2, 2, 9, 30, 0).unwrap(),
        };
        let body = format_review_request(SITE, &recipient(), &review);

        assert_eq!(body.subject, "Post awaiting review in Q&A");
        assert!(body.text.contains("discussion.php?d=5#p77"));
        assert!(body.text.contains("2026-02-02 09:30 UTC"));
        assert!(body.html.contains("Q&amp;A"));
        assert!(body.html.contains("mod/moodleoverflow/view.php?m=3"));
    }
}
