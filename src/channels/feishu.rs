//! Feishu (Lark) webhook bot channel.
//!
//! Alert groups are rendered as interactive cards; anything else is sent as a
//! plain text message. When a signing secret is configured every request
//! carries a fresh `timestamp` and `sign` pair.

use super::{http_client, ChannelDefaults, DeliveryError};
use crate::core::{Alert, AlertGroup, Channel, Event};
use crate::formatting::{format_labels, format_local_time, render_plain_text, source_tag};
use crate::routes::{ConfigError, FeishuChannelConfig};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use chrono_tz::Tz;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, error, info, instrument};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_NAME: &str = "feishu";

/// Computes the Feishu bot signature for a unix timestamp.
///
/// The key is `"{timestamp}\n{secret}"` and the signed message is empty.
pub fn sign(timestamp: &str, secret: &str) -> Result<String, DeliveryError> {
    let string_to_sign = format!("{}\n{}", timestamp, secret);
    let mac = HmacSha256::new_from_slice(string_to_sign.as_bytes())
        .map_err(|e| DeliveryError::Render(e.to_string()))?;
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn md_div(content: String) -> Value {
    json!({
        "tag": "div",
        "text": {"tag": "lark_md", "content": content},
    })
}

/// A Feishu webhook bot.
pub struct FeishuChannel {
    name: String,
    webhook_url: String,
    secret: String,
    timezone: Tz,
    client: reqwest::Client,
}

impl FeishuChannel {
    pub fn from_config(
        config: &FeishuChannelConfig,
        defaults: &ChannelDefaults,
    ) -> Result<Self, ConfigError> {
        let name = if config.name.is_empty() {
            DEFAULT_NAME.to_string()
        } else {
            config.name.clone()
        };
        let client = http_client(&name, defaults.timeout)?;
        Ok(Self {
            name,
            webhook_url: config.webhook_url.clone(),
            secret: config.secret.clone(),
            timezone: defaults.timezone,
            client,
        })
    }

    /// Builds the unsigned message body for an event.
    pub fn build_message(&self, event: &Event) -> Value {
        match event.alert_group() {
            Some(group) => self.build_card_message(&group),
            None => json!({
                "msg_type": "text",
                "content": {"text": render_plain_text(event)},
            }),
        }
    }

    fn build_card_message(&self, group: &AlertGroup) -> Value {
        let (status_text, status_emoji, template) = if group.is_firing() {
            ("告警触发", "🚨", "red")
        } else {
            ("告警恢复", "✅", "green")
        };

        let header = json!({
            "title": {
                "tag": "plain_text",
                "content": format!("{} {} {}", status_emoji, source_tag(&group.source), status_text),
            },
            "template": template,
        });

        let mut elements = Vec::new();
        if !group.receiver.is_empty() {
            elements.push(md_div(format!("**接收器:** {}", group.receiver)));
        }

        for (i, alert) in group.alerts.iter().enumerate() {
            if i > 0 {
                elements.push(json!({"tag": "hr"}));
            }
            elements.extend(self.alert_elements(alert));
        }

        let firing = group.firing_alerts().count();
        let resolved = group.resolved_alerts().count();
        elements.push(json!({"tag": "hr"}));
        elements.push(json!({
            "tag": "note",
            "elements": [{
                "tag": "plain_text",
                "content": format!("来源: {} | 触发: {} | 恢复: {}", group.source, firing, resolved),
            }],
        }));

        json!({
            "msg_type": "interactive",
            "card": {"header": header, "elements": elements},
        })
    }

    fn alert_elements(&self, alert: &Alert) -> Vec<Value> {
        let marker = if alert.is_firing() { "🔴" } else { "🟢" };
        let mut elements = vec![md_div(format!("{} **{}**", marker, alert.name))];

        if !alert.summary.is_empty() {
            elements.push(md_div(format!("**摘要:** {}", alert.summary)));
        }
        if !alert.description.is_empty() {
            elements.push(md_div(format!("**详情:** {}", alert.description)));
        }

        let started = format_local_time(alert.starts_at.as_deref(), self.timezone);
        elements.push(md_div(format!("**触发时间:** {}", started)));

        if let Some(labels) = format_labels(&alert.labels) {
            elements.push(md_div(format!("**标签:** {}", labels)));
        }
        if !alert.generator_url.is_empty() {
            elements.push(md_div(format!("[查看详情]({})", alert.generator_url)));
        }
        elements
    }
}

#[async_trait]
impl Channel for FeishuChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    #[instrument(skip(self, event), fields(channel = %self.name))]
    async fn send(&self, event: &Event) -> Result<(), DeliveryError> {
        let mut message = self.build_message(event);

        if !self.secret.is_empty() {
            let timestamp = Utc::now().timestamp().to_string();
            let signature = sign(&timestamp, &self.secret)?;
            message["timestamp"] = Value::from(timestamp);
            message["sign"] = Value::from(signature);
        }

        debug!("Posting message to Feishu webhook.");
        let response = self.client.post(&self.webhook_url).json(&message).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result: Value = response.json().await?;
        if result.get("code").and_then(Value::as_i64) != Some(0) {
            error!(response = %result, "Feishu API error");
            return Err(DeliveryError::Api(result.to_string()));
        }

        info!("Event sent to Feishu successfully.");
        Ok(())
    }
}
