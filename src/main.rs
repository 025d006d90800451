use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod config;
mod db;
mod digest;
mod error;
mod jobs;
mod mail;
mod models;
mod rank;
mod report;
mod stats;
mod telemetry;

use config::AppConfig;
use mail::{LogTransport, MailTransport, OutboxTransport};
use models::UserStats;
use rank::{Direction, SortKey};

#[derive(Parser)]
#[command(name = "overflow-insights")]
#[command(about = "User statistics and scheduled mail for overflow discussion forums", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StatsArgs {
    #[arg(long)]
    course: i64,
    /// Forum instance whose activity is reported separately
    #[arg(long)]
    forum: i64,
    #[arg(long, default_value = "activity")]
    sort: String,
    #[arg(long, default_value = "desc")]
    direction: String,
    /// Read join rows from CSV instead of the database
    #[arg(long)]
    rows_csv: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Print ranked user statistics
    Stats {
        #[command(flatten)]
        args: StatsArgs,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Export ranked user statistics as CSV
    Export {
        #[command(flatten)]
        args: StatsArgs,
        #[arg(long, default_value = "userstats.csv")]
        out: PathBuf,
    },
    /// Generate a markdown report, or the HTML statistics table
    Report {
        #[command(flatten)]
        args: StatsArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long)]
        html: bool,
    },
    /// Mail unread-post digests and clear the delivered records
    SendDigests,
    /// Remind reviewers about posts waiting for review
    SendReviewReminders,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.log_level)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Stats { args, limit } => {
            let (_, _, ranked) = collect_stats(&pool, &args).await?;

            if ranked.is_empty() {
                println!("No enrolled users in course {}.", args.course);
                return Ok(());
            }

            println!("Users by {} ({}):", args.sort, args.direction);
            for stats in ranked.iter().take(limit) {
                println!(
                    "- {} activity {} ({} in forum), +{} / -{}, reputation {} ({} in forum)",
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
        Commands::Export { args, out } => {
            let (_, _, ranked) = collect_stats(&pool, &args).await?;
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            report::write_csv(file, &ranked)?;
            println!("Exported {} users to {}.", ranked.len(), out.display());
        }
        Commands::Report { args, out, html } => {
            let (key, direction, ranked) = collect_stats(&pool, &args).await?;
            let output = if html {
                report::stats_table_html(&config.mail.site_url, args.course, &ranked)
            } else {
                let label = format!("course {}", args.course);
                report::build_report(&label, args.forum, key, direction, &ranked)
            };
            std::fs::write(&out, output)?;
            println!("Report written to {}.", out.display());
        }
        Commands::SendDigests => {
            let queue = db::PgMailQueue::new(pool.clone());
            let transport = build_transport(config.mail.outbox.as_deref());
            let summary = jobs::send_digests(&queue, transport.as_ref(), &config.mail).await?;
            println!(
                "Digests sent: {}, failed: {}, skipped: {}.",
                summary.sent, summary.failed, summary.skipped
            );
        }
        Commands::SendReviewReminders => {
            let queue = db::PgMailQueue::new(pool.clone());
            let transport = build_transport(config.mail.outbox.as_deref());
            let summary =
                jobs::send_review_reminders(&queue, transport.as_ref(), &config.mail).await?;
            println!(
                "Review reminders sent: {}, failed: {}, skipped: {}.",
                summary.sent, summary.failed, summary.skipped
            );
        }
    }

    Ok(())
}

async fn collect_stats(
    pool: &PgPool,
    args: &StatsArgs,
) -> anyhow::Result<(SortKey, Direction, Vec<UserStats>)> {
    let key: SortKey = args.sort.parse()?;
    let direction: Direction = args.direction.parse()?;

    let rows = match &args.rows_csv {
        Some(path) => db::import_rows_csv(path)?,
        None => db::fetch_join_rows(pool, args.course).await?,
    };
    let users = db::fetch_enrolled_users(pool, args.course).await?;
    let reputation = db::fetch_reputation(pool, args.course, args.forum).await?;
    tracing::debug!(rows = rows.len(), users = users.len(), "aggregating user statistics");

    let aggregated = stats::aggregate(&rows, &users, args.forum, &reputation);
    let ranked = rank::rank(aggregated.into_values().collect(), key, direction);
    Ok((key, direction, ranked))
}

fn build_transport(outbox: Option<&Path>) -> Box<dyn MailTransport> {
    match outbox {
        Some(path) => {
            tracing::info!(path = %path.display(), "queueing mail in outbox");
            Box::new(OutboxTransport::new(path))
        }
        None => {
            tracing::info!("no outbox configured, logging mail only");
            Box::new(LogTransport)
        }
    }
}
