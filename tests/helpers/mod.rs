#![allow(dead_code)]
//! Shared helpers for integration tests.

pub mod app;
pub mod mock_channel;

use bullet::core::Event;
use serde_json::{json, Value};

/// A minimal firing Grafana payload with one alert.
pub fn grafana_payload(labels: Value) -> Value {
    json!({
        "receiver": "bullet",
        "status": "firing",
        "externalURL": "http://grafana.local",
        "commonLabels": labels,
        "alerts": [{
            "status": "firing",
            "labels": labels,
            "annotations": { "summary": "CPU above 90%" },
            "startsAt": "2024-05-01T08:00:00Z",
            "generatorURL": "http://grafana.local/alerting/1"
        }]
    })
}

pub fn event(source: &str, labels: &[(&str, &str)]) -> Event {
    labels
        .iter()
        .fold(Event::new(source, "alert"), |event, (k, v)| {
            event.with_label(*k, *v)
        })
}
