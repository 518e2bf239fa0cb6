//! Telegram and Discord delivery of status messages
//!
//! Every send runs as its own task on a [`TaskTracker`] so callers never wait
//! on the network. `flush` is the only place that waits, and after it returns
//! further messages are dropped.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::domain::services::{Notifier, Severity};
use crate::infrastructure::config::{NotificationConfig, TelegramConfig};
use crate::infrastructure::http_client::HttpClient;

const TELEGRAM_API: &str = "https://api.telegram.org";

pub struct ChannelNotifier {
    http: HttpClient,
    config: NotificationConfig,
    tracker: TaskTracker,
    closed: AtomicBool,
}

impl ChannelNotifier {
    pub fn new(http: HttpClient, config: NotificationConfig) -> Self {
        if config.telegram.is_none() && config.discord.is_none() {
            info!("No notification channel enabled");
        }
        Self {
            http,
            config,
            tracker: TaskTracker::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn spawn_send(&self, channel: &'static str, url: String, body: Value, message: String) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(channel, "No runtime available, notification dropped");
            return;
        };
        let http = self.http.clone();
        self.tracker.spawn_on(
            async move {
                match http.post_json(&url, &body).await {
                    Ok(()) => info!(channel, %message, "Notification sent"),
                    Err(e) => error!(channel, error = %e, "Failed to send notification"),
                }
            },
            &handle,
        );
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        if self.closed.load(Ordering::SeqCst) {
            debug!(%message, "Notifier closed, message dropped");
            return;
        }
        if !severity.passes(self.config.min_severity) {
            return;
        }
        if let Some(telegram) = &self.config.telegram {
            self.spawn_send(
                "telegram",
                telegram_url(telegram),
                telegram_payload(telegram, message),
                message.to_string(),
            );
        }
        if let Some(discord) = &self.config.discord {
            self.spawn_send(
                "discord",
                discord.webhook_url.clone(),
                discord_payload(message, severity),
                message.to_string(),
            );
        }
    }

    async fn flush(&self, timeout: Duration) {
        self.closed.store(true, Ordering::SeqCst);
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(pending = self.tracker.len(), "Gave up waiting for notifications");
        }
    }
}

fn telegram_url(config: &TelegramConfig) -> String {
    format!("{TELEGRAM_API}/bot{}/sendMessage", config.token)
}

fn telegram_payload(config: &TelegramConfig, message: &str) -> Value {
    json!({
        "chat_id": config.chat_id,
        "text": message,
        "parse_mode": "HTML",
    })
}

fn discord_payload(message: &str, severity: Severity) -> Value {
    let (title, color) = match severity {
        Severity::Error => ("Error Notification", 0xFF_00_00),
        Severity::Warn => ("Warning Notification", 0xFF_FF_00),
        Severity::Info => ("Info Notification", 0x00_FF_00),
    };
    json!({
        "embeds": [{
            "title": title,
            "description": message,
            "color": color,
            "timestamp": Utc::now().to_rfc3339(),
        }]
    })
}
