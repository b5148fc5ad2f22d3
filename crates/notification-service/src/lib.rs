mod smtp;
mod templates;

pub use smtp::SmtpNotifier;
pub use templates::EmailTemplate;

use async_trait::async_trait;
use screener_core::ScanReport;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Alert types that trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlertType {
    ScanCompleted {
        /// Comma-joined tickers, ready to paste into a charting tool.
        superstocks: String,
        watchlist: String,
        superstock_count: usize,
        watchlist_count: usize,
        lots_skipped: usize,
        symbols_skipped: usize,
        elapsed_minutes: f64,
    },
    ScanFailed {
        reason: String,
    },
}

/// A file sent along with an alert (e-mail only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn csv(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: "text/csv".to_string(),
            bytes,
        }
    }

    /// Read a CSV artifact from disk.
    pub fn csv_from_path(path: &Path) -> Result<Self, NotificationError> {
        let bytes = std::fs::read(path)
            .map_err(|e| NotificationError::Attachment(format!("{}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export.csv".to_string());
        Ok(Self::csv(file_name, bytes))
    }
}

/// A notification alert to be dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            alert_type,
            timestamp: chrono::Utc::now(),
            title: title.into(),
            message: message.into(),
            attachments: Vec::new(),
        }
    }

    /// Summary of a finished scan.
    pub fn scan_completed(report: &ScanReport) -> Self {
        let result = &report.result;
        let title = format!(
            "Superstock scan: {} superstocks, {} watchlist",
            result.superstock_count(),
            result.watchlist_count()
        );
        let message = format!(
            "Scanned {} tickers in {:.1} minutes",
            report.stats.universe_size,
            report.elapsed_minutes()
        );

        Self::new(
            AlertType::ScanCompleted {
                superstocks: result.superstock_tickers(),
                watchlist: result.watchlist_tickers(),
                superstock_count: result.superstock_count(),
                watchlist_count: result.watchlist_count(),
                lots_skipped: report.stats.lots_skipped,
                symbols_skipped: report.stats.symbols_skipped(),
                elapsed_minutes: report.elapsed_minutes(),
            },
            title,
            message,
        )
    }

    pub fn scan_failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            AlertType::ScanFailed {
                reason: reason.clone(),
            },
            "Superstock scan failed",
            reason,
        )
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("Discord webhook error: {0}")]
    Discord(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Attachment error: {0}")]
    Attachment(String),
}

/// Configuration for the notification service.
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_to: Vec<String>,
    pub smtp_tls: SmtpTls,
    pub discord_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SmtpTls {
    #[default]
    StartTls,
    Tls,
    None,
}

impl SmtpTls {
    fn from_setting(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "tls" => SmtpTls::Tls,
            "none" => SmtpTls::None,
            _ => SmtpTls::StartTls,
        }
    }
}

fn parse_recipients(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

impl NotificationConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        Self {
            smtp_host: non_empty_var("SMTP_HOST"),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(587),
            smtp_username: non_empty_var("SMTP_USERNAME"),
            smtp_password: non_empty_var("SMTP_PASSWORD"),
            smtp_from: non_empty_var("SMTP_FROM_ADDRESS"),
            smtp_to: parse_recipients(&std::env::var("NOTIFICATION_EMAIL_TO").unwrap_or_default()),
            smtp_tls: SmtpTls::from_setting(&std::env::var("SMTP_TLS").unwrap_or_default()),
            discord_webhook_url: non_empty_var("DISCORD_WEBHOOK_URL"),
        }
    }

    pub fn smtp_enabled(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_from.is_some() && !self.smtp_to.is_empty()
    }
}

/// Dispatches alerts to every configured channel.
pub struct NotificationService {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationService {
    pub fn new(config: &NotificationConfig) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        if config.smtp_enabled() {
            match SmtpNotifier::new(config) {
                Ok(notifier) => {
                    tracing::info!(
                        "Email notifications enabled (SMTP -> {} recipients)",
                        config.smtp_to.len()
                    );
                    channels.push(Box::new(notifier));
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP notifier: {}", e);
                }
            }
        }

        if let Some(ref webhook_url) = config.discord_webhook_url {
            channels.push(Box::new(DiscordWebhookNotifier {
                webhook_url: webhook_url.clone(),
                client: reqwest::Client::new(),
            }));
            tracing::info!("Discord webhook notifications enabled");
        }

        if channels.is_empty() {
            tracing::info!(
                "No notification channels configured (set SMTP_HOST or DISCORD_WEBHOOK_URL)"
            );
        }

        Self { channels }
    }

    pub fn with_channels(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Send to every channel in turn. A failing channel is logged and does
    /// not stop the others; returns how many channels delivered.
    pub async fn send_alert_async(&self, alert: &Alert) -> usize {
        let mut delivered = 0;
        for channel in self.channels.iter() {
            match channel.send(alert).await {
                Ok(()) => {
                    tracing::debug!("Sent notification via {}", channel.name());
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to send notification via {}: {}", channel.name(), e)
                }
            }
        }
        delivered
    }
}

// Discord rejects embed descriptions above 4096 characters
const DISCORD_DESCRIPTION_LIMIT: usize = 4000;

/// Discord webhook notifier.
struct DiscordWebhookNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

fn discord_payload(alert: &Alert) -> serde_json::Value {
    let color = match &alert.alert_type {
        AlertType::ScanCompleted {
            superstock_count, ..
        } => {
            if *superstock_count > 0 {
                0x00ff00
            } else {
                0x94a3b8
            }
        }
        AlertType::ScanFailed { .. } => 0xff0000,
    };

    let mut description = EmailTemplate::render(alert);
    if description.chars().count() > DISCORD_DESCRIPTION_LIMIT {
        description = description.chars().take(DISCORD_DESCRIPTION_LIMIT).collect();
        description.push_str("...");
    }

    serde_json::json!({
        "embeds": [{
            "title": alert.title,
            "description": description,
            "color": color,
            "timestamp": alert.timestamp.to_rfc3339(),
        }]
    })
}

#[async_trait]
impl NotificationChannel for DiscordWebhookNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&discord_payload(alert))
            .send()
            .await
            .map_err(|e| NotificationError::Discord(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotificationError::Discord(format!("HTTP {}", response.status())));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "discord-webhook"
    }
}
