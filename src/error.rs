use thiserror::Error;

use crate::mail::MailError;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("DATABASE_URL must be set to a production Postgres instance")]
    MissingDatabaseUrl,

    #[error("{key} must be a valid {expected}, got '{value}'")]
    InvalidNumber {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("mail delivery failed: {0}")]
    Mail(#[from] MailError),

    #[error("recipient {0} has no email address")]
    MissingEmail(i64),
}
