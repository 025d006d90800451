use std::fmt::Write;

use crate::digest::escape_html;
use crate::models::UserStats;
use crate::rank::{Direction, SortKey};

/// Column headers of the statistics table, in display order.
pub const COLUMNS: [(SortKey, &str); 7] = [
    (SortKey::Username, "Name"),
    (SortKey::ReceivedUpvotes, "Received upvotes"),
    (SortKey::ReceivedDownvotes, "Received downvotes"),
    (SortKey::ForumActivity, "Activity in this forum"),
    (SortKey::Activity, "Activity in this course"),
    (SortKey::ForumReputation, "Reputation in this forum"),
    (SortKey::Reputation, "Reputation in this course"),
];

pub fn badge(value: i64) -> String {
    let style = if value > 0 { "success" } else { "warning" };
    format!("<span class=\"badge badge-{style}\">{value}</span>")
}

pub fn profile_link(site_url: &str, course_id: i64, stats: &UserStats) -> String {
    format!(
        "<a href=\"{site_url}/user/view.php?id={}&amp;course={course_id}\">{}</a>",
        stats.user_id,
        escape_html(&stats.display_name)
    )
}

/// Renders already ranked records as an HTML table, one badge per counter.
pub fn stats_table_html(site_url: &str, course_id: i64, rows: &[UserStats]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "<table class=\"overflow-userstats\">");
    let _ = write!(output, "<thead><tr>");
    for (key, label) in COLUMNS {
        let _ = write!(
            output,
            "<th data-sort=\"{}\" data-sortable=\"{}\">{}</th>",
            key,
            key.is_sortable(),
            label
        );
    }
    let _ = writeln!(output, "</tr></thead>");
    let _ = writeln!(output, "<tbody>");

    for stats in rows {
        let _ = writeln!(
            output,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            profile_link(site_url, course_id, stats),
            badge(i64::from(stats.received_upvotes)),
            badge(i64::from(stats.received_downvotes)),
            badge(i64::from(stats.forum_activity)),
            badge(i64::from(stats.activity)),
            badge(stats.forum_reputation),
            badge(stats.reputation)
        );
    }

    let _ = writeln!(output, "</tbody>");
    let _ = writeln!(output, "</table>");
    output
}

pub fn build_report(
    course_label: &str,
    forum_id: i64,
    key: SortKey,
    direction: Direction,
    ranked: &[UserStats],
) -> String {
    let mut output = String::new();
    let direction_label = match direction {
        Direction::Ascending => "ascending",
        Direction::Descending => "descending",
    };

    let _ = writeln!(output, "# Overflow Activity Report");
    let _ = writeln!(
        output,
        "Generated for {} (forum {}), sorted by {} {}",
        course_label, forum_id, key, direction_label
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Totals");

    let active = ranked.iter().filter(|s| s.activity > 0).count();
    let upvotes: u32 = ranked.iter().map(|s| s.received_upvotes).sum();
    let downvotes: u32 = ranked.iter().map(|s| s.received_downvotes).sum();
    let forum_activity: u32 = ranked.iter().map(|s| s.forum_activity).sum();
    let _ = writeln!(
        output,
        "- {} enrolled users, {} with activity",
        ranked.len(),
        active
    );
    let _ = writeln!(output, "- {upvotes} upvotes and {downvotes} downvotes received");
    let _ = writeln!(output, "- {forum_activity} posts and ratings in this forum");

    let _ = writeln!(output);
    let _ = writeln!(output, "## Ranking");

    if ranked.is_empty() {
        let _ = writeln!(output, "No enrolled users.");
    } else {
        for stats in ranked.iter() {
            let _ = writeln!(
                output,
                "- {}: activity {} ({} in forum), +{} / -{}, reputation {} ({} in forum)",
                stats.display_name,
                stats.activity,
                stats.forum_activity,
                stats.received_upvotes,
                stats.received_downvotes,
                stats.reputation,
                stats.forum_reputation
            );
        }
    }

    let inactive: Vec<&str> = ranked
        .iter()
        .filter(|s| s.activity == 0)
        .map(|s| s.display_name.as_str())
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Without Activity");

    if inactive.is_empty() {
        let _ = writeln!(output, "Every enrolled user has posted or rated.");
    } else {
        let _ = writeln!(output, "{}", inactive.join(", "));
    }

    output
}

pub fn write_csv<W: std::io::Write>(writer: W, rows: &[UserStats]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for stats in rows {
        writer.serialize(stats)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(user_id: i64, name: &str, activity: u32, upvotes: u32) -> UserStats {
        UserStats {
            user_id,
            display_name: name.to_string(),
            activity,
            forum_activity: activity,
            received_upvotes: upvotes,
            reputation: i64::from(upvotes) * 2,
            ..UserStats::default()
        }
    }

    #[test]
    fn badges_flag_non_positive_values() {
        assert_eq!(badge(3), "<span class=\"badge badge-success\">3</span>");
        assert_eq!(badge(0), "<span class=\"badge badge-warning\">0</span>");
        assert_eq!(badge(-2), "<span class=\"badge badge-warning\">-2</span>");
    }

    #[test]
    fn profile_link_escapes_the_name() {
        let link = profile_link("https://lms.example.edu", 4, &stats(9, "O'Neil <TA>", 0, 0));
        assert_eq!(
            link,
            "<a href=\"https://lms.example.edu/user/view.php?id=9&amp;course=4\">O&#39;Neil &lt;TA&gt;</a>"
        );
    }

    #[test]
    fn table_keeps_row_order_and_disables_name_sorting() {
        let rows = vec![stats(2, "Jules Moreno", 4, 1), stats(1, "Avery Lee", 0, 0)];
        let html = stats_table_html("https://lms.example.edu", 1, &rows);

        assert!(html.contains("data-sort=\"username\" data-sortable=\"false\""));
        assert!(html.contains("data-sort=\"activity\" data-sortable=\"true\""));
        let jules = html.find("Jules Moreno").unwrap();
        let avery = html.find("Avery Lee").unwrap();
        assert!(jules < avery);
        assert_eq!(html.matches("<tr><td>").count(), 2);
    }

    #[test]
    fn report_lists_totals_and_inactive_users() {
        let rows = vec![stats(2, "Jules Moreno", 4, 3), stats(1, "Avery Lee", 0, 0)];
        let report = build_report("Cell Biology", 1, SortKey::Activity, Direction::Descending, &rows);

        assert!(report.contains("sorted by activity descending"));
        assert!(report.contains("- 2 enrolled users, 1 with activity"));
        assert!(report.contains("- 3 upvotes and 0 downvotes received"));
        assert!(report.contains("## Without Activity\nAvery Lee"));
    }

    #[test]
    fn csv_export_skips_dedup_sets() {
        let mut row = stats(1, "Avery Lee", 2, 1);
        row.submitted_post_ids.insert(10);
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &[row]).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "user_id,display_name,received_upvotes,received_downvotes,forum_activity,activity,forum_reputation,reputation"
        );
        assert_eq!(lines.next().unwrap(), "1,Avery Lee,1,0,2,2,0,2");
    }
}
