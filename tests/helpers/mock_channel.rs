//! A channel that records calls instead of doing network I/O.

use async_trait::async_trait;
use bullet::channels::DeliveryError;
use bullet::core::{Channel, Event};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::time::Instant;

/// Start and end of each `send`, shared between channels of one test.
pub type Timeline = Arc<Mutex<Vec<(String, Instant, Instant)>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    Rejected,
    NetworkFailure,
}

/// Counts `send` invocations and returns a fixed outcome.
pub struct MockChannel {
    name: String,
    enabled: bool,
    outcome: Outcome,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Event>>>,
    delay: Duration,
    timeline: Option<Timeline>,
}

impl MockChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            outcome: Outcome::Delivered,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
            timeline: None,
        }
    }

    /// Makes every `send` take `delay` and record its span in `timeline`.
    pub fn with_delay(mut self, delay: Duration, timeline: &Timeline) -> Self {
        self.delay = delay;
        self.timeline = Some(timeline.clone());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Handle to the call counter; stays valid after the channel is boxed.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn seen(&self) -> Arc<Mutex<Vec<Event>>> {
        self.seen.clone()
    }

    pub fn boxed(self) -> Box<dyn Channel> {
        Box::new(self)
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, event: &Event) -> Result<(), DeliveryError> {
        let started = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(event.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(timeline) = &self.timeline {
            timeline
                .lock()
                .unwrap()
                .push((self.name.clone(), started, Instant::now()));
        }
        match self.outcome {
            Outcome::Delivered => Ok(()),
            Outcome::Rejected => Err(DeliveryError::Api("code 19001: rejected".to_string())),
            Outcome::NetworkFailure => Err(DeliveryError::Status {
                status: 503,
                body: "connection reset".to_string(),
            }),
        }
    }
}

pub fn call_count(calls: &Arc<AtomicUsize>) -> usize {
    calls.load(Ordering::SeqCst)
}
