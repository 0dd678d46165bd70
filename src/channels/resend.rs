//! Resend transactional e-mail channel.
//!
//! Subjects and bodies are Jinja templates rendered with `minijinja`. A
//! built-in HTML template is used unless the route names its own file.

use super::{http_client, ChannelDefaults, DeliveryError};
use crate::core::{AlertGroup, Channel, Event};
use crate::formatting::{display_labels, format_local_time, render_plain_text, source_tag};
use crate::routes::{ConfigError, ResendEmailChannelConfig};
use async_trait::async_trait;
use chrono_tz::Tz;
use minijinja::{AutoEscape, Environment};
use serde::Serialize;
use serde_json::{json, Value};
use std::{fs, path::PathBuf};
use tracing::{debug, error, info, instrument};

const DEFAULT_NAME: &str = "resend_email";

const DEFAULT_HTML_TEMPLATE: &str = r#"<div style="font-family: sans-serif">
<h2 style="color: {{ accent }}">{{ title }}</h2>
{% if group %}
{% if group.receiver %}<p><strong>Receiver:</strong> {{ group.receiver }}</p>{% endif %}
{% for alert in alerts %}
{% if not loop.first %}<hr>{% endif %}
<h3>{% if alert.firing %}&#128308;{% else %}&#128994;{% endif %} {{ alert.name }}</h3>
{% if alert.summary %}<p><strong>Summary:</strong> {{ alert.summary }}</p>{% endif %}
{% if alert.description %}<p><strong>Description:</strong> {{ alert.description }}</p>{% endif %}
<p><strong>Started:</strong> {{ alert.started_at }}</p>
{% if alert.labels %}<p><strong>Labels:</strong> {% for label in alert.labels %}<code>{{ label.key }}={{ label.value }}</code>{% if not loop.last %} | {% endif %}{% endfor %}</p>{% endif %}
{% if alert.generator_url %}<p><a href="{{ alert.generator_url }}">View details</a></p>{% endif %}
{% endfor %}
<hr>
<p><small>Source: {{ event.source }} | Firing: {{ firing_count }} | Resolved: {{ resolved_count }}</small></p>
{% else %}
<pre>{{ text }}</pre>
{% endif %}
</div>
"#;

#[derive(Serialize)]
struct LabelView<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct AlertView<'a> {
    name: &'a str,
    status: &'a str,
    firing: bool,
    summary: &'a str,
    description: &'a str,
    started_at: String,
    labels: Vec<LabelView<'a>>,
    generator_url: &'a str,
}

/// Everything a subject or body template can refer to.
#[derive(Serialize)]
struct EmailContext<'a> {
    event: &'a Event,
    group: Option<&'a AlertGroup>,
    alerts: Vec<AlertView<'a>>,
    firing_count: usize,
    resolved_count: usize,
    title: String,
    accent: &'static str,
    text: String,
}

impl<'a> EmailContext<'a> {
    fn new(event: &'a Event, group: Option<&'a AlertGroup>, tz: Tz) -> Self {
        let alerts: Vec<AlertView<'a>> = group
            .map(|g| {
                g.alerts
                    .iter()
                    .map(|a| AlertView {
                        name: &a.name,
                        status: &a.status,
                        firing: a.is_firing(),
                        summary: &a.summary,
                        description: &a.description,
                        started_at: format_local_time(a.starts_at.as_deref(), tz),
                        labels: display_labels(&a.labels)
                            .into_iter()
                            .map(|(key, value)| LabelView { key, value })
                            .collect(),
                        generator_url: &a.generator_url,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let firing_count = alerts.iter().filter(|a| a.firing).count();
        let resolved_count = alerts.len() - firing_count;

        let (title, accent) = match group {
            Some(g) => {
                let mut title = format!("{} {}", source_tag(&g.source), g.status.to_uppercase());
                if let Some(first) = g.alerts.first() {
                    title.push_str(&format!(": {}", first.name));
                    if g.alerts.len() > 1 {
                        title.push_str(&format!(" (+{} more)", g.alerts.len() - 1));
                    }
                }
                let accent = if g.is_firing() { "#d93026" } else { "#1e8e3e" };
                (title, accent)
            }
            None => {
                let kind = if event.kind.is_empty() { "event" } else { event.kind.as_str() };
                (format!("{} {}", source_tag(&event.source), kind), "#1a73e8")
            }
        };

        Self {
            event,
            group,
            alerts,
            firing_count,
            resolved_count,
            title,
            accent,
            text: render_plain_text(event),
        }
    }
}

/// An e-mail channel backed by the Resend API.
pub struct ResendEmailChannel {
    name: String,
    api_url: String,
    api_key: String,
    from_email: String,
    to: Vec<String>,
    reply_to: String,
    subject_prefix: String,
    subject_template: Option<String>,
    html_template: String,
    timezone: Tz,
    client: reqwest::Client,
}

impl ResendEmailChannel {
    pub fn from_config(
        config: &ResendEmailChannelConfig,
        defaults: &ChannelDefaults,
    ) -> Result<Self, ConfigError> {
        let name = if config.name.is_empty() {
            DEFAULT_NAME.to_string()
        } else {
            config.name.clone()
        };

        let html_template = if config.template_path.is_empty() {
            DEFAULT_HTML_TEMPLATE.to_string()
        } else {
            let path = PathBuf::from(&config.template_path);
            fs::read_to_string(&path).map_err(|e| ConfigError::Template {
                path: path.clone(),
                reason: e.to_string(),
            })?
        };
        validate_template(&name, &html_template)?;

        let subject_template = if config.subject_template.is_empty() {
            None
        } else {
            validate_template(&name, &config.subject_template)?;
            Some(config.subject_template.clone())
        };

        let api_key = if config.api_key.is_empty() {
            defaults.resend_api_key.clone()
        } else {
            config.api_key.clone()
        };
        let from_email = if config.from_email.is_empty() {
            defaults.resend_from_email.clone()
        } else {
            config.from_email.clone()
        };

        let client = http_client(&name, defaults.timeout)?;
        Ok(Self {
            name,
            api_url: defaults.resend_api_url.clone(),
            api_key,
            from_email,
            to: config.to.clone(),
            reply_to: config.reply_to.clone(),
            subject_prefix: config.subject_prefix.clone(),
            subject_template,
            html_template,
            timezone: defaults.timezone,
            client,
        })
    }

    /// Renders the subject and HTML body for an event.
    pub fn render(&self, event: &Event) -> Result<(String, String), DeliveryError> {
        let group = event.alert_group();
        let ctx = EmailContext::new(event, group.as_ref(), self.timezone);

        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        let html = env
            .render_str(&self.html_template, &ctx)
            .map_err(|e| DeliveryError::Render(e.to_string()))?;

        let mut plain = Environment::new();
        plain.set_auto_escape_callback(|_| AutoEscape::None);
        let subject = match &self.subject_template {
            Some(template) => plain
                .render_str(template, &ctx)
                .map_err(|e| DeliveryError::Render(e.to_string()))?,
            None => format!("{}{}", self.subject_prefix, ctx.title),
        };

        Ok((subject.trim().to_string(), html))
    }
}

fn validate_template(channel: &str, source: &str) -> Result<(), ConfigError> {
    Environment::new()
        .template_from_str(source)
        .map(|_| ())
        .map_err(|e| ConfigError::Channel {
            channel: channel.to_string(),
            reason: format!("invalid template: {}", e),
        })
}

#[async_trait]
impl Channel for ResendEmailChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        !self.api_key.is_empty() && !self.from_email.is_empty() && !self.to.is_empty()
    }

    #[instrument(skip(self, event), fields(channel = %self.name, recipients = self.to.len()))]
    async fn send(&self, event: &Event) -> Result<(), DeliveryError> {
        let (subject, html) = self.render(event)?;

        let mut message = json!({
            "from": self.from_email,
            "to": self.to,
            "subject": subject,
            "html": html,
        });
        if !self.reply_to.is_empty() {
            message["reply_to"] = Value::from(self.reply_to.clone());
        }

        debug!("Posting e-mail to Resend.");
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result: Value = response.json().await?;
        match result.get("id").and_then(Value::as_str) {
            Some(id) => {
                info!(email_id = id, "E-mail sent via Resend.");
                Ok(())
            }
            None => {
                error!(response = %result, "Resend API returned no message id");
                Err(DeliveryError::Api(result.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Alert, Labels};
    use std::io::Write;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> ResendEmailChannelConfig {
        ResendEmailChannelConfig {
            to: vec!["oncall@example.com".to_string()],
            from_email: "Alerts <alerts@example.com>".to_string(),
            api_key: "re_test".to_string(),
            ..Default::default()
        }
    }

    fn defaults(api_url: &str) -> ChannelDefaults {
        ChannelDefaults {
            resend_api_url: api_url.to_string(),
            timezone: chrono_tz::UTC,
            ..Default::default()
        }
    }

    fn alert_event() -> Event {
        Event::from_alert_group(&AlertGroup {
            source: "grafana".to_string(),
            status: "firing".to_string(),
            alerts: vec![
                Alert {
                    name: "HighCPU".to_string(),
                    status: "firing".to_string(),
                    summary: "CPU <90%>".to_string(),
                    starts_at: Some("2025-01-02T03:04:05Z".to_string()),
                    labels: Labels::from([("env".to_string(), "prod".to_string())]),
                    ..Default::default()
                },
                Alert {
                    name: "DiskFull".to_string(),
                    status: "resolved".to_string(),
                    ..Default::default()
                },
            ],
            labels: Labels::new(),
            external_url: String::new(),
            receiver: String::new(),
        })
    }

    #[test]
    fn test_enabled_requires_key_sender_and_recipients() {
        let channel = ResendEmailChannel::from_config(&config(), &defaults(RESEND)).unwrap();
        assert!(channel.enabled());

        let mut no_key = config();
        no_key.api_key.clear();
        let channel = ResendEmailChannel::from_config(&no_key, &defaults(RESEND)).unwrap();
        assert!(!channel.enabled());

        let mut no_recipients = config();
        no_recipients.to.clear();
        let channel = ResendEmailChannel::from_config(&no_recipients, &defaults(RESEND)).unwrap();
        assert!(!channel.enabled());
    }

    const RESEND: &str = "https://api.resend.com/emails";

    #[test]
    fn test_default_subject_and_body() {
        let mut cfg = config();
        cfg.subject_prefix = "[prod] ".to_string();
        let channel = ResendEmailChannel::from_config(&cfg, &defaults(RESEND)).unwrap();

        let (subject, html) = channel.render(&alert_event()).unwrap();
        assert_eq!(subject, "[prod] [GRAFANA] FIRING: HighCPU (+1 more)");
        assert!(html.contains("HighCPU"));
        assert!(html.contains("CPU &lt;90%&gt;"));
        assert!(html.contains("2025-01-02 03:04:05"));
        assert!(html.contains("<code>env=prod</code>"));
        assert!(html.contains("Firing: 1 | Resolved: 1"));
    }

    #[test]
    fn test_subject_template() {
        let mut cfg = config();
        cfg.subject_template =
            "{{ event.source }}: {{ firing_count }} firing / {{ resolved_count }} resolved".to_string();
        let channel = ResendEmailChannel::from_config(&cfg, &defaults(RESEND)).unwrap();

        let (subject, _) = channel.render(&alert_event()).unwrap();
        assert_eq!(subject, "grafana: 1 firing / 1 resolved");
    }

    #[test]
    fn test_template_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "<p>{{{{ title }}}} for {{{{ event.type }}}}</p>").unwrap();

        let mut cfg = config();
        cfg.template_path = file.path().display().to_string();
        let channel = ResendEmailChannel::from_config(&cfg, &defaults(RESEND)).unwrap();

        let (_, html) = channel.render(&Event::new("kline", "price")).unwrap();
        assert_eq!(html, "<p>[KLINE] price for price</p>");
    }

    #[test]
    fn test_invalid_subject_template_is_a_config_error() {
        let mut cfg = config();
        cfg.subject_template = "{{ unclosed".to_string();
        let result = ResendEmailChannel::from_config(&cfg, &defaults(RESEND));
        assert!(matches!(result, Err(ConfigError::Channel { .. })));
    }

    #[test]
    fn test_non_alert_event_renders_text() {
        let channel = ResendEmailChannel::from_config(&config(), &defaults(RESEND)).unwrap();
        let (subject, html) = channel
            .render(&Event::new("kline", "price").with_label("symbol", "BTC"))
            .unwrap();
        assert_eq!(subject, "[KLINE] price");
        assert!(html.contains("<pre>[KLINE] price\nlabels: symbol=BTC</pre>"));
    }

    #[tokio::test]
    async fn test_send_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer re_test"))
            .and(body_partial_json(json!({
                "from": "Alerts <alerts@example.com>",
                "to": ["oncall@example.com"],
                "reply_to": "team@example.com",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "email_123"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config();
        cfg.reply_to = "team@example.com".to_string();
        let channel = ResendEmailChannel::from_config(&cfg, &defaults(&server.uri())).unwrap();
        assert!(channel.send(&alert_event()).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"message": "invalid from"})),
            )
            .mount(&server)
            .await;

        let channel = ResendEmailChannel::from_config(&config(), &defaults(&server.uri())).unwrap();
        let result = channel.send(&alert_event()).await;
        assert!(matches!(result, Err(DeliveryError::Status { status: 422, .. })));
        assert!(!channel.send_safe(&alert_event()).await);
    }

    #[tokio::test]
    async fn test_send_without_id_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let channel = ResendEmailChannel::from_config(&config(), &defaults(&server.uri())).unwrap();
        let result = channel.send(&alert_event()).await;
        assert!(matches!(result, Err(DeliveryError::Api(_))));
    }
}
