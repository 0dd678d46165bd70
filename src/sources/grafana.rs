//! Parser for Grafana Unified Alerting webhooks.

use super::SourceError;
use crate::core::{Alert, AlertGroup, Event, Labels, Source};
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;

const SOURCE_NAME: &str = "grafana";

/// Grafana webhook payload, as posted by a Grafana contact point.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrafanaPayload {
    #[serde(default)]
    receiver: String,
    #[serde(default = "firing")]
    status: String,
    #[serde(default)]
    alerts: Vec<GrafanaAlert>,
    #[serde(default)]
    common_labels: Labels,
    #[serde(default, rename = "externalURL")]
    external_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrafanaAlert {
    #[serde(default = "firing")]
    status: String,
    #[serde(default)]
    labels: Labels,
    #[serde(default)]
    annotations: Labels,
    #[serde(default)]
    starts_at: String,
    #[serde(default)]
    ends_at: String,
    #[serde(default, rename = "generatorURL")]
    generator_url: String,
    #[serde(default)]
    fingerprint: String,
}

fn firing() -> String {
    "firing".to_string()
}

/// Normalizes an RFC 3339 timestamp, dropping empty or malformed values.
fn parse_timestamp(ts: &str) -> Option<String> {
    if ts.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.to_rfc3339())
}

impl From<GrafanaAlert> for Alert {
    fn from(raw: GrafanaAlert) -> Self {
        let name = raw
            .labels
            .get("alertname")
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        let severity = raw
            .labels
            .get("severity")
            .cloned()
            .unwrap_or_else(|| "warning".to_string());

        Alert {
            name,
            status: raw.status,
            severity,
            summary: raw.annotations.get("summary").cloned().unwrap_or_default(),
            description: raw
                .annotations
                .get("description")
                .cloned()
                .unwrap_or_default(),
            starts_at: parse_timestamp(&raw.starts_at),
            ends_at: parse_timestamp(&raw.ends_at),
            generator_url: raw.generator_url,
            fingerprint: raw.fingerprint,
            labels: raw.labels,
            annotations: raw.annotations,
        }
    }
}

/// Source adapter for Grafana alerting webhooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrafanaSource;

impl GrafanaSource {
    /// Parses a Grafana payload into an alert group.
    pub fn parse_group(&self, payload: &Value) -> Result<AlertGroup, SourceError> {
        if !payload.is_object() {
            return Err(SourceError::Parse("expected a JSON object".to_string()));
        }
        let raw: GrafanaPayload = serde_json::from_value(payload.clone())
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let alerts: Vec<Alert> = raw.alerts.into_iter().map(Alert::from).collect();

        let labels = if raw.common_labels.is_empty() {
            alerts.first().map(|a| a.labels.clone()).unwrap_or_default()
        } else {
            raw.common_labels
        };

        Ok(AlertGroup {
            source: SOURCE_NAME.to_string(),
            status: raw.status,
            alerts,
            labels,
            external_url: raw.external_url,
            receiver: raw.receiver,
        })
    }
}

impl Source for GrafanaSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn parse(&self, payload: &Value) -> Result<Event, SourceError> {
        let group = self.parse_group(payload)?;
        Ok(Event::from_alert_group(&group))
    }
}
