use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::config::TelegramConfig;
use crate::error::AppError;

/// Telegram caps messages at 4096 chars; leave room for framing.
const MAX_MESSAGE_LEN: usize = 4000;

/// Delivery channel for rendered change reports. Delivery must either
/// confirm success or fail with `Transport`; the reporter only closes the
/// idempotency window after a confirmed send.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_report(&self, text: &str) -> Result<(), AppError>;
}

pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn send_message(&self, text: &str) -> Result<(), AppError> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.config.bot_token
        );

        let response = self
            .client
            .post(&url)
            .json(&SendMessageRequest {
                chat_id: &self.config.chat_id,
                text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Transport(format!(
                "Telegram API error {status}: {body}"
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_report(&self, text: &str) -> Result<(), AppError> {
        for chunk in split_report(text, MAX_MESSAGE_LEN) {
            self.send_message(&chunk).await?;
        }
        info!("report sent to chat {}", self.config.chat_id);
        Ok(())
    }
}

/// No-delivery channel for tests and `--no-telegram` runs.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_report(&self, _text: &str) -> Result<(), AppError> {
        Ok(())
    }
}

/// Split a long report into chunks at blank lines (course boundaries) so a
/// course's lines never straddle two messages.
pub fn split_report(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for block in text.split("\n\n") {
        let candidate_len = if current.is_empty() {
            block.len()
        } else {
            current.len() + 2 + block.len()
        };

        if candidate_len > max_len && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(block);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_reports_stay_whole() {
        let chunks = split_report("header\n\ncourse", 100);
        assert_eq!(chunks, vec!["header\n\ncourse".to_string()]);
    }

    #[test]
    fn long_reports_split_on_course_boundaries() {
        let blocks: Vec<String> = (0..10).map(|i| format!("COURSE {i}\n  line")).collect();
        let text = blocks.join("\n\n");

        let chunks = split_report(&text, 40);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.starts_with('\n'));
            assert!(chunk.contains("COURSE"));
        }
        assert_eq!(chunks.join("\n\n"), text);
    }
}
