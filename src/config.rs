use std::env;
use std::path::PathBuf;

use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub feed_url: Option<String>,
    pub milestones_path: PathBuf,
    pub poll_interval_secs: u64,
    pub http_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://coursewatch.db?mode=rwc".to_string()),
            data_dir: env::var("COURSEWATCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            feed_url: env::var("COURSEWATCH_FEED_URL").ok(),
            milestones_path: env::var("COURSEWATCH_MILESTONES")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("milestones.json")),
            poll_interval_secs: env::var("COURSEWATCH_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1800),
            http_timeout_secs: env::var("COURSEWATCH_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }

    /// The on-disk store file behind `database_url`, if it is a file-backed
    /// sqlite URL. Used by `db backup`.
    pub fn database_file(&self) -> Option<PathBuf> {
        let rest = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))?;
        let path = rest.split('?').next().unwrap_or(rest);
        if path.is_empty() || path == ":memory:" {
            return None;
        }
        Some(PathBuf::from(path))
    }
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| AppError::Config("TELEGRAM_BOT_TOKEN is not set".to_string()))?;
        let chat_id = env::var("TELEGRAM_CHAT_ID")
            .map_err(|_| AppError::Config("TELEGRAM_CHAT_ID is not set".to_string()))?;

        Ok(Self { bot_token, chat_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_file_strips_scheme_and_params() {
        let mut config = AppConfig::from_env();
        config.database_url = "sqlite://enrollment.db?mode=rwc".to_string();
        assert_eq!(config.database_file(), Some(PathBuf::from("enrollment.db")));

        config.database_url = "sqlite::memory:".to_string();
        assert_eq!(config.database_file(), None);
    }
}
