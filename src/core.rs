//! Core domain types and service traits for Bullet
//!
//! This module defines the canonical `Event` envelope every source adapter
//! produces, the alert-group shape carried inside alert events, and the trait
//! contracts that channels and sources implement.

use crate::channels::DeliveryError;
use crate::sources::SourceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{error, warn};

/// Event type used for alert-group payloads.
pub const ALERT_EVENT: &str = "alert";

/// Label-style string mapping used for routing.
pub type Labels = BTreeMap<String, String>;

/// A generic event that can be routed and delivered to channels.
///
/// Events are built once by a source adapter and are only ever handed out by
/// shared reference afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Event {
    /// Origin system, e.g. "grafana". Empty means unspecified.
    pub source: String,
    /// Free-form event kind, e.g. "alert".
    #[serde(rename = "type")]
    pub kind: String,
    /// Labels used for route matching.
    pub labels: Labels,
    /// Vendor-specific content.
    pub payload: Map<String, Value>,
    /// Side-channel data that never takes part in matching.
    pub meta: Map<String, Value>,
}

impl Event {
    /// Creates an event with the given source and kind and no labels or payload.
    pub fn new(source: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = meta;
        self
    }

    /// Wraps an alert group into an `alert` event.
    ///
    /// The group's common labels become the routing labels and the whole group
    /// is carried as the payload.
    pub fn from_alert_group(group: &AlertGroup) -> Self {
        let payload = match serde_json::to_value(group) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let mut meta = Map::new();
        if !group.receiver.is_empty() {
            meta.insert("receiver".into(), Value::from(group.receiver.clone()));
        }
        if !group.external_url.is_empty() {
            meta.insert("external_url".into(), Value::from(group.external_url.clone()));
        }

        Self {
            source: group.source.clone(),
            kind: ALERT_EVENT.to_string(),
            labels: group.labels.clone(),
            payload,
            meta,
        }
    }

    /// Interprets the payload as an alert group.
    ///
    /// Returns `None` unless the event is of type `alert` and the payload has a
    /// status and a list of sub-alerts.
    pub fn alert_group(&self) -> Option<AlertGroup> {
        if self.kind != ALERT_EVENT {
            return None;
        }
        serde_json::from_value(Value::Object(self.payload.clone())).ok()
    }
}

/// A group of alerts delivered together by an upstream alert manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertGroup {
    #[serde(default)]
    pub source: String,
    /// Overall status, "firing" or "resolved".
    pub status: String,
    pub alerts: Vec<Alert>,
    /// Labels shared by every alert in the group.
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub external_url: String,
    #[serde(default)]
    pub receiver: String,
}

impl AlertGroup {
    pub fn is_firing(&self) -> bool {
        self.status == "firing"
    }

    pub fn firing_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|a| a.is_firing())
    }

    pub fn resolved_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|a| !a.is_firing())
    }
}

/// A single alert within an `AlertGroup`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Alert {
    pub name: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
    /// RFC 3339 start time, if the source provided a parseable one.
    #[serde(default)]
    pub starts_at: Option<String>,
    #[serde(default)]
    pub ends_at: Option<String>,
    #[serde(default)]
    pub generator_url: String,
    #[serde(default)]
    pub fingerprint: String,
}

fn default_status() -> String {
    "firing".to_string()
}

impl Alert {
    pub fn is_firing(&self) -> bool {
        self.status == "firing"
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// An outbound notification target.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable identifier used in logs and as the key in dispatch results.
    fn name(&self) -> &str;

    /// Whether the channel has enough configuration to deliver anything.
    fn enabled(&self) -> bool;

    /// Renders the event into the channel's wire format and transmits it.
    ///
    /// # Returns
    /// * `Ok(())` once the remote end acknowledged the message
    /// * `Err` for rendering, transport, HTTP status or application-level failures
    async fn send(&self, event: &Event) -> Result<(), DeliveryError>;

    /// Sends the event, reporting any failure as `false` instead of an error.
    ///
    /// A disabled channel returns `false` without calling `send`.
    async fn send_safe(&self, event: &Event) -> bool {
        if !self.enabled() {
            warn!(channel = self.name(), "Channel is disabled, skipping delivery");
            return false;
        }
        match self.send(event).await {
            Ok(()) => true,
            Err(e) => {
                error!(channel = self.name(), error = %e, "Failed to send to channel");
                false
            }
        }
    }
}

/// Translates a vendor webhook payload into an `Event`.
pub trait Source: Send + Sync {
    /// Source name, matched against the `{source}` segment of the webhook path.
    fn name(&self) -> &str;

    /// Parses a raw JSON payload.
    fn parse(&self, payload: &Value) -> Result<Event, SourceError>;
}
