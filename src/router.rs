//! Event routing and delivery dispatch.
//!
//! The `Dispatcher` owns the routing configuration plus one list of built
//! channels per route. For each event it picks the first matching route and
//! attempts every channel of that route, collecting a per-channel outcome.

use crate::channels::{build_channel, ChannelDefaults};
use crate::config::FanOut;
use crate::core::{Channel, Event};
use crate::internal_metrics::Metrics;
use crate::routes::{ConfigError, Route, RoutesConfig};
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Per-channel delivery outcome, keyed by channel name.
///
/// Empty means the event was discarded: no route matched, or the matched
/// route has no channels.
pub type DispatchResults = BTreeMap<String, bool>;

/// The route an event matched, with its built channels.
pub struct RouteMatch<'a> {
    pub key: String,
    pub route: &'a Route,
    pub channels: &'a [Box<dyn Channel>],
}

/// Matches events against routes and fans them out to channels.
///
/// Read-only after construction; share it behind an `Arc`.
pub struct Dispatcher {
    config: RoutesConfig,
    /// Channels for each route, aligned by index with `config.routes`.
    route_channels: Vec<Vec<Box<dyn Channel>>>,
    fan_out: FanOut,
    metrics: Metrics,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.config.routes.len())
            .field("fan_out", &self.fan_out)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Builds every route's channels from configuration.
    pub fn new(config: RoutesConfig, defaults: &ChannelDefaults) -> Result<Self, ConfigError> {
        let mut route_channels = Vec::with_capacity(config.routes.len());
        for (i, route) in config.routes.iter().enumerate() {
            let key = route.key(i);
            let channels = route
                .channels
                .iter()
                .map(|c| build_channel(c, defaults))
                .collect::<Result<Vec<_>, _>>()
                .inspect_err(|e| error!(route = %key, error = %e, "Failed to build channel"))?;
            warn_on_duplicate_names(&key, &channels);
            debug!(route = %key, channels = channels.len(), "Built route channels");
            route_channels.push(channels);
        }

        info!("Router initialized with {} route(s)", config.routes.len());
        Ok(Self {
            config,
            route_channels,
            fan_out: FanOut::default(),
            metrics: Metrics::default(),
        })
    }

    /// Assembles a dispatcher from already-built channels.
    ///
    /// `channels[i]` belongs to `config.routes[i]`; routes without an entry get
    /// no channels.
    pub fn from_parts(config: RoutesConfig, mut channels: Vec<Vec<Box<dyn Channel>>>) -> Self {
        channels.resize_with(config.routes.len(), Vec::new);
        for (i, route) in config.routes.iter().enumerate() {
            warn_on_duplicate_names(&route.key(i), &channels[i]);
        }
        Self {
            config,
            route_channels: channels,
            fan_out: FanOut::default(),
            metrics: Metrics::default(),
        }
    }

    pub fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.config.routes
    }

    pub fn fan_out(&self) -> FanOut {
        self.fan_out
    }

    /// Finds the first route matching the event's source and labels.
    pub fn find_route(&self, event: &Event) -> Option<RouteMatch<'_>> {
        debug!(source = %event.source, labels = ?event.labels, "Matching event");

        let found = self
            .config
            .routes
            .iter()
            .enumerate()
            .find(|(_, route)| route.matches(&event.source, &event.labels));

        match found {
            Some((i, route)) => {
                let channels = self.route_channels.get(i).map(Vec::as_slice).unwrap_or(&[]);
                let key = route.key(i);
                info!(route = %key, "Matched route with {} channel(s)", channels.len());
                Some(RouteMatch {
                    key,
                    route,
                    channels,
                })
            }
            None => {
                info!("No matching route found, event will be discarded");
                None
            }
        }
    }

    /// Delivers the event to every channel of the first matching route.
    ///
    /// Every channel is attempted regardless of earlier failures. When two
    /// channels share a name, the later one's outcome is kept.
    #[instrument(skip_all, fields(source = %event.source, kind = %event.kind))]
    pub async fn route(&self, event: &Event) -> DispatchResults {
        let Some(matched) = self.find_route(event) else {
            self.metrics.increment_discarded(&event.source);
            return DispatchResults::new();
        };
        if matched.channels.is_empty() {
            info!(route = %matched.key, "Matched route has no channels, event discarded");
            self.metrics.increment_discarded(&event.source);
            return DispatchResults::new();
        }

        let outcomes: Vec<(String, bool)> = match self.fan_out {
            FanOut::Sequential => {
                let mut outcomes = Vec::with_capacity(matched.channels.len());
                for channel in matched.channels {
                    outcomes.push(self.deliver(channel.as_ref(), event).await);
                }
                outcomes
            }
            FanOut::Concurrent => {
                join_all(
                    matched
                        .channels
                        .iter()
                        .map(|channel| self.deliver(channel.as_ref(), event)),
                )
                .await
            }
        };

        outcomes.into_iter().collect()
    }

    async fn deliver(&self, channel: &dyn Channel, event: &Event) -> (String, bool) {
        let start = Instant::now();
        let delivered = channel.send_safe(event).await;
        self.metrics
            .record_delivery(channel.name(), delivered, start.elapsed());

        if delivered {
            info!(channel = channel.name(), "Event sent");
        } else {
            error!(channel = channel.name(), "Failed to send event");
        }
        (channel.name().to_string(), delivered)
    }
}

fn warn_on_duplicate_names(route: &str, channels: &[Box<dyn Channel>]) {
    let mut seen = HashSet::new();
    for channel in channels {
        if !seen.insert(channel.name()) {
            warn!(
                route,
                channel = channel.name(),
                "Duplicate channel name in route; only the last result will be reported"
            );
        }
    }
}
