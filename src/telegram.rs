//! Lead notifications through the Telegram Bot API.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// What a notification says about a freshly captured lead.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactNotice {
    pub request_id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub dress_name: Option<String>,
    pub message: Option<String>,
    pub locale: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// `true` only when the provider acknowledged delivery. Never fails.
    async fn notify(&self, notice: &ContactNotice) -> bool;
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    bot_token: Option<String>,
    chat_id: Option<String>,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: Option<String>, chat_id: Option<String>) -> Result<Self> {
        let user_agent = format!("bridal-leads/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .user_agent(user_agent)
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self {
            client,
            bot_token: bot_token.filter(|s| !s.trim().is_empty()),
            chat_id: chat_id.filter(|s| !s.trim().is_empty()),
            api_base: TELEGRAM_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    async fn send(&self, token: &str, chat_id: &str, text: String) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            // reqwest errors embed the URL, which carries the bot token.
            .map_err(|e| anyhow!("Telegram request failed: {}", e.without_url()))?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Telegram sendMessage HTTP error (status {}): {}",
                status,
                detail
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, notice: &ContactNotice) -> bool {
        let (Some(token), Some(chat_id)) = (self.bot_token.as_deref(), self.chat_id.as_deref())
        else {
            warn!(
                request_id = %notice.request_id,
                "Telegram is not configured (TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID); skipping notification"
            );
            return false;
        };

        match self.send(token, chat_id, format_notice(notice)).await {
            Ok(()) => {
                debug!(request_id = %notice.request_id, "Telegram notification delivered");
                true
            }
            Err(e) => {
                warn!(request_id = %notice.request_id, "Telegram notification failed: {:#}", e);
                false
            }
        }
    }
}

pub fn format_notice(notice: &ContactNotice) -> String {
    let mut lines = vec![
        "<b>New contact request</b>".to_string(),
        String::new(),
        format!("<b>Name:</b> {}", escape_html(&notice.name)),
        format!("<b>Phone:</b> {}", escape_html(&notice.phone)),
    ];
    if let Some(email) = &notice.email {
        lines.push(format!("<b>Email:</b> {}", escape_html(email)));
    }
    if let Some(dress) = &notice.dress_name {
        lines.push(format!("<b>Dress:</b> {}", escape_html(dress)));
    }
    if let Some(message) = &notice.message {
        lines.push(String::new());
        lines.push("<b>Message:</b>".to_string());
        lines.push(escape_html(message));
    }
    if let Some(locale) = &notice.locale {
        lines.push(String::new());
        lines.push(format!("<i>Locale: {}</i>", escape_html(locale)));
    }
    lines.join("\n")
}

/// Escapes the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
