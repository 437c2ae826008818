use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skintrack_core::config::TelegramConfig;
use skintrack_core::notify::error::NotifyError;
use skintrack_core::notify::port::Notifier;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// # Summary
/// Pushes price alerts into a Telegram chat through the Bot API `sendMessage` method.
///
/// # Invariants
/// * Token and chat id are non-empty.
/// * `endpoint` is the full `sendMessage` URL, built once at construction.
pub struct TelegramNotifier {
    endpoint: String,
    chat_id: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Error envelope returned by the Bot API on failure.
#[derive(Deserialize)]
struct ApiError {
    description: Option<String>,
}

/// Escapes the characters legacy Markdown treats as markup, so item names
/// such as `Sticker | team_name` are not rejected as malformed entities.
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl TelegramNotifier {
    /// # Summary
    /// Creates a notifier bound to one chat.
    ///
    /// # Arguments
    /// * `bot_token` - Bot API token.
    /// * `chat_id` - Target chat.
    /// * `api_base` - Bot API root, e.g. `https://api.telegram.org`. Trailing slashes are ignored.
    ///
    /// # Returns
    /// * `NotifyError::Config` when a credential is blank or the client cannot be built.
    pub fn new(bot_token: String, chat_id: String, api_base: &str) -> Result<Self, NotifyError> {
        let bot_token = bot_token.trim();
        let chat_id = chat_id.trim();
        if bot_token.is_empty() || chat_id.is_empty() {
            return Err(NotifyError::Config("Telegram bot token and chat id are required".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), bot_token),
            chat_id: chat_id.to_string(),
            client,
        })
    }

    pub fn from_config(config: &TelegramConfig) -> Result<Self, NotifyError> {
        Self::new(config.bot_token.clone(), config.chat_id.clone(), &config.api_base)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    /// # Summary
    /// Sends the alert as one Markdown message: bold subject, then the body.
    ///
    /// # Returns
    /// * `NotifyError::Network` when the API cannot be reached.
    /// * `NotifyError::Platform` with the API's description on a non-2xx reply.
    async fn notify(&self, subject: &str, content: &str) -> Result<(), NotifyError> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: format!("*{}*\n{}", escape_markdown(subject), escape_markdown(content)),
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let description = response
                .json::<ApiError>()
                .await
                .ok()
                .and_then(|body| body.description)
                .unwrap_or_else(|| "no description".to_string());
            return Err(NotifyError::Platform(format!(
                "Telegram rejected the message ({}): {}",
                status, description
            )));
        }

        debug!(chat_id = %self.chat_id, "Telegram alert delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("AWP | Asiimov"), "AWP | Asiimov");
        assert_eq!(escape_markdown("Sticker | s1mple_*gold*"), "Sticker | s1mple\\_\\*gold\\*");
        assert_eq!(escape_markdown("[x] `y`"), "\\[x] \\`y\\`");
    }

    #[test]
    fn test_endpoint_ignores_trailing_slash() {
        rustls::crypto::ring::default_provider().install_default().ok();
        let notifier = TelegramNotifier::new(" token ".into(), "42".into(), "http://localhost:9/").unwrap();
        assert_eq!(notifier.endpoint, "http://localhost:9/bottoken/sendMessage");
    }
}
