use std::env;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Upper bound for the review delay: one hundred years.
pub const MAX_REVIEW_DELAY_MINUTES: i64 = 525_600 * 100;

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub log_level: String,
    pub mail: MailSettings,
}

/// Settings shared by the mail jobs and renderers.
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub site_url: String,
    pub from: String,
    pub review_delay_minutes: i64,
    pub outbox: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;
        let max_connections = parse_var("OVERFLOW_DB_MAX_CONNECTIONS", "5", "u32")?;
        let review_delay_minutes = review_delay_minutes()?;
        let log_level = env::var("OVERFLOW_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let site_url = env::var("OVERFLOW_SITE_URL")
            .unwrap_or_else(|_| "http://localhost".to_string())
            .trim_end_matches('/')
            .to_string();
        let from = env::var("OVERFLOW_MAIL_FROM").unwrap_or_else(|_| "noreply@localhost".to_string());
        let outbox = env::var("OVERFLOW_OUTBOX")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            database_url,
            max_connections,
            log_level,
            mail: MailSettings {
                site_url,
                from,
                review_delay_minutes,
                outbox,
            },
        })
    }
}

fn review_delay_minutes() -> Result<i64, ConfigError> {
    const KEY: &str = "OVERFLOW_REVIEW_DELAY_MINUTES";
    const EXPECTED: &str = "number of minutes between 0 and 52560000";

    let minutes: i64 = parse_var(KEY, "60", EXPECTED)?;
    if !(0..=MAX_REVIEW_DELAY_MINUTES).contains(&minutes) {
        return Err(ConfigError::InvalidNumber {
            key: KEY,
            expected: EXPECTED,
            value: minutes.to_string(),
        });
    }
    Ok(minutes)
}

fn parse_var<T: std::str::FromStr>(
    key: &'static str,
    default: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidNumber {
            key,
            expected,
            value,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "DATABASE_URL",
            "OVERFLOW_DB_MAX_CONNECTIONS",
            "OVERFLOW_REVIEW_DELAY_MINUTES",
            "OVERFLOW_LOG_LEVEL",
            "OVERFLOW_SITE_URL",
            "OVERFLOW_MAIL_FROM",
            "OVERFLOW_OUTBOX",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_only_database_is_set() {
        let _lock = env_guard().lock().unwrap();
        reset_env();
        env::set_var("DATABASE_URL", "postgres://localhost/overflow");

        let config = AppConfig::load().unwrap();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.mail.site_url, "http://localhost");
        assert_eq!(config.mail.review_delay_minutes, 60);
        assert!(config.mail.outbox.is_none());
        reset_env();
    }

    #[test]
    fn trims_trailing_slash_from_site_url() {
        let _lock = env_guard().lock().unwrap();
        reset_env();
        env::set_var("DATABASE_URL", "postgres://localhost/overflow");
        env::set_var("OVERFLOW_SITE_URL", "https://lms.example.edu/");
        env::set_var("OVERFLOW_OUTBOX", "/var/spool/overflow.jsonl");

        let config = AppConfig::load().unwrap();
        assert_eq!(config.mail.site_url, "https://lms.example.edu");
        assert_eq!(
            config.mail.outbox,
            Some(PathBuf::from("/var/spool/overflow.jsonl"))
        );
        reset_env();
    }

    #[test]
    fn rejects_out_of_range_review_delay() {
        let _lock = env_guard().lock().unwrap();
        reset_env();
        env::set_var("DATABASE_URL", "postgres://localhost/overflow");

        for value in ["9000000000000", "-5"] {
            env::set_var("OVERFLOW_REVIEW_DELAY_MINUTES", value);
            let err = AppConfig::load().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidNumber {
                    key: "OVERFLOW_REVIEW_DELAY_MINUTES",
                    ..
                }
            ));
        }

        env::set_var("OVERFLOW_REVIEW_DELAY_MINUTES", "52560000");
        assert_eq!(
            AppConfig::load().unwrap().mail.review_delay_minutes,
            MAX_REVIEW_DELAY_MINUTES
        );
        reset_env();
    }

    #[test]
    fn rejects_invalid_numbers() {
        let _lock = env_guard().lock().unwrap();
        reset_env();
        env::set_var("DATABASE_URL", "postgres://localhost/overflow");
        env::set_var("OVERFLOW_DB_MAX_CONNECTIONS", "many");

        let err = AppConfig::load().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                key: "OVERFLOW_DB_MAX_CONNECTIONS",
                ..
            }
        ));
        reset_env();
    }
}
