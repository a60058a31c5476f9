// Fire-and-forget operator alerts
//
// Delivery failures are logged and swallowed: an alert can never turn a
// successful trading action into a failed one.

use crate::config::AlertConfig;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Logical destination of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Entries and closes
    Trade,
    /// Batch lifecycle and risk summaries
    Status,
    /// Failures and diagnostics
    Error,
}

/// Colour-coded kind of alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    LongEntry,
    ShortEntry,
    Close,
    Status,
    Error,
}

impl Severity {
    pub fn color(&self) -> u32 {
        match self {
            Severity::LongEntry => 0x55efc4,
            Severity::ShortEntry => 0xff7675,
            Severity::Close => 0xfdcb6e,
            Severity::Status | Severity::Error => 0xe17055,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub channel: Channel,
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub fields: Vec<(String, String)>,
}

impl Alert {
    pub fn new(channel: Channel, severity: Severity, title: impl Into<String>) -> Self {
        Self {
            channel,
            title: title.into(),
            description: None,
            severity,
            fields: Vec::new(),
        }
    }

    pub fn trade(severity: Severity, title: impl Into<String>) -> Self {
        Self::new(Channel::Trade, severity, title)
    }

    pub fn status(title: impl Into<String>) -> Self {
        Self::new(Channel::Status, Severity::Status, title)
    }

    pub fn error(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(Channel::Error, Severity::Error, title).with_description(detail)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((name.into(), value.to_string()));
        self
    }

    /// Value of the first field called `name`
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Sink for operator alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `alert`; never fails from the caller's point of view
    async fn send(&self, alert: Alert);
}

/// Writes every alert to the tracing log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

fn render_fields(alert: &Alert) -> String {
    alert
        .fields
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, alert: Alert) {
        let description = alert.description.as_deref().unwrap_or("");
        let fields = render_fields(&alert);

        match alert.channel {
            Channel::Error => {
                tracing::error!("[alert] {} {} {}", alert.title, description, fields)
            }
            Channel::Trade | Channel::Status => {
                tracing::info!("[alert] {} {} {}", alert.title, description, fields)
            }
        }
    }
}

/// Posts alerts as Discord embeds, one webhook per channel
///
/// A channel without a webhook falls back to the log.
#[derive(Clone)]
pub struct DiscordNotifier {
    client: Client,
    trade_webhook: Option<String>,
    status_webhook: Option<String>,
    error_webhook: Option<String>,
    footer: String,
}

impl DiscordNotifier {
    pub fn new(config: &AlertConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            client,
            trade_webhook: config.trade_webhook.clone(),
            status_webhook: config.status_webhook.clone(),
            error_webhook: config.error_webhook.clone(),
            footer: config.footer.clone(),
        })
    }

    fn webhook(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Trade => self.trade_webhook.as_deref(),
            Channel::Status => self.status_webhook.as_deref(),
            Channel::Error => self.error_webhook.as_deref(),
        }
    }

    fn payload(&self, alert: &Alert) -> serde_json::Value {
        let mut fields: Vec<serde_json::Value> = alert
            .fields
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": format!("`{}`", value), "inline": true }))
            .collect();
        fields.push(json!({
            "name": "Time",
            "value": format!("`{}`", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
            "inline": false,
        }));

        let mut embed = json!({
            "title": alert.title,
            "color": alert.severity.color(),
            "fields": fields,
            "footer": { "text": self.footer },
        });
        if let Some(description) = &alert.description {
            embed["description"] = json!(description);
        }

        json!({ "embeds": [embed] })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, alert: Alert) {
        let Some(url) = self.webhook(alert.channel) else {
            LogNotifier.send(alert).await;
            return;
        };

        match self.client.post(url).json(&self.payload(&alert)).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Delivered alert '{}'", alert.title);
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                tracing::warn!("Alert '{}' rejected by webhook ({}): {}", alert.title, status, body);
            }
            Err(e) => {
                tracing::warn!("Failed to deliver alert '{}': {}", alert.title, e);
            }
        }
    }
}

/// Discord when any webhook is configured, otherwise log-only
pub fn notifier_from_config(config: &AlertConfig) -> Result<Arc<dyn Notifier>> {
    let any_webhook = config.trade_webhook.is_some()
        || config.status_webhook.is_some()
        || config.error_webhook.is_some();

    if any_webhook {
        Ok(Arc::new(DiscordNotifier::new(config)?))
    } else {
        tracing::info!("No alert webhooks configured, alerts go to the log only");
        Ok(Arc::new(LogNotifier))
    }
}
