use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
}

#[derive(Error, Debug)]
pub enum MailError {
    #[error("outbox write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport rejected message to {to}: {reason}")]
    Rejected { to: String, reason: String },
}

/// Delivers one message. Implementations must not retry on their own.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Dry-run transport: logs every message instead of delivering it.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "mail (dry run)");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct OutboxRecord<'a> {
    id: Uuid,
    queued_at: DateTime<Utc>,
    #[serde(flatten)]
    mail: &'a OutgoingMail,
}

/// Appends each message as one JSON line to a spool file picked up by a relay.
#[derive(Debug, Clone)]
pub struct OutboxTransport {
    path: PathBuf,
}

impl OutboxTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MailTransport for OutboxTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let record = OutboxRecord {
            id: Uuid::new_v4(),
            queued_at: Utc::now(),
            mail,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(id = %record.id, to = %mail.to, "queued mail in outbox");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(to: &str) -> OutgoingMail {
        OutgoingMail {
            to: to.to_string(),
            from: "noreply@lms.example.edu".to_string(),
            subject: "Unread posts".to_string(),
            body_text: "hello".to_string(),
            body_html: "<p>hello</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn outbox_appends_one_line_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let transport = OutboxTransport::new(&path);

        transport.send(&sample("avery@example.com")).await.unwrap();
        transport.send(&sample("jules@example.com")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["to"], "avery@example.com");
        assert_eq!(lines[1]["subject"], "Unread posts");
        assert!(lines[0]["id"].is_string());
        assert_ne!(lines[0]["id"], lines[1]["id"]);
    }

    #[tokio::test]
    async fn log_transport_accepts_everything() {
        LogTransport.send(&sample("kiara@example.com")).await.unwrap();
    }
}
