use async_trait::async_trait;
use std::time::Duration;
use talon_core::{Notifier, NotifyError};
use tracing::debug;

/// Sends operator notifications through the Telegram Bot API.
pub struct TelegramNotifier {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    fn send_message_url(&self) -> String {
        format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token)
    }

    fn payload(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(self.send_message_url())
            .json(&self.payload(text))
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError(format!(
                "telegram responded {}",
                response.status()
            )));
        }
        debug!("telegram notification delivered");
        Ok(())
    }
}

/// Stand-in when no bot is configured; accepts and drops every message.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        debug!("notification (no channel configured): {text}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_url_embeds_token() {
        let notifier = TelegramNotifier::new("123:abc", "-100456");
        assert_eq!(
            notifier.send_message_url(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_payload_shape() {
        let notifier = TelegramNotifier::new("123:abc", "-100456");
        let payload = notifier.payload("Seat claimed!");
        assert_eq!(payload["chat_id"], "-100456");
        assert_eq!(payload["text"], "Seat claimed!");
    }

    #[tokio::test]
    async fn test_null_notifier_always_accepts() {
        assert!(NullNotifier.notify("anything").await.is_ok());
    }
}
