//! Rendering helpers shared by the channel implementations.

use crate::core::{Event, Labels};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Label that names the alert itself; it is already shown as the title.
const ALERT_NAME_LABEL: &str = "alertname";

/// Converts an RFC 3339 timestamp to a local `YYYY-MM-DD HH:MM:SS` string.
///
/// Missing or malformed timestamps fall back to the current time.
pub fn format_local_time(timestamp: Option<&str>, tz: Tz) -> String {
    let utc = timestamp
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    utc.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Labels other than `alertname`, in key order.
pub fn display_labels(labels: &Labels) -> Vec<(&str, &str)> {
    labels
        .iter()
        .filter(|(k, _)| k.as_str() != ALERT_NAME_LABEL)
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}

/// Renders labels as `` `k=v` | `k=v` ``, or `None` when nothing is left to show.
pub fn format_labels(labels: &Labels) -> Option<String> {
    let pairs = display_labels(labels);
    if pairs.is_empty() {
        return None;
    }
    Some(
        pairs
            .into_iter()
            .map(|(k, v)| format!("`{}={}`", k, v))
            .collect::<Vec<_>>()
            .join(" | "),
    )
}

/// Upper-cased source tag, e.g. `[GRAFANA]`. Unspecified sources render as `[UNKNOWN]`.
pub fn source_tag(source: &str) -> String {
    if source.is_empty() {
        "[UNKNOWN]".to_string()
    } else {
        format!("[{}]", source.to_uppercase())
    }
}

/// Generic text rendering for events that are not recognized alert groups.
pub fn render_plain_text(event: &Event) -> String {
    let mut lines = vec![format!(
        "{} {}",
        source_tag(&event.source),
        if event.kind.is_empty() { "event" } else { event.kind.as_str() }
    )];

    if !event.labels.is_empty() {
        let labels = event
            .labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("labels: {}", labels));
    }

    if !event.payload.is_empty() {
        let payload = serde_json::to_string_pretty(&event.payload)
            .unwrap_or_else(|_| "<unserializable payload>".to_string());
        lines.push(format!("payload:\n{}", payload));
    }

    lines.join("\n")
}
