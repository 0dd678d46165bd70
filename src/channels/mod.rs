//! Outbound notification channels and the factory that builds them from
//! routing configuration.
//!
//! Adding a channel kind means adding a `ChannelConfig` variant and a match arm
//! in [`build_channel`]; the dispatcher only ever sees `dyn Channel`.

pub mod feishu;
pub mod resend;

use crate::config::Config;
use crate::core::Channel;
use crate::routes::{ChannelConfig, ConfigError};
use chrono_tz::Tz;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub use feishu::FeishuChannel;
pub use resend::ResendEmailChannel;

/// Default Resend API endpoint.
pub const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("failed to render message: {0}")]
    Render(String),
}

impl DeliveryError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeliveryError::Http(e) if e.is_timeout())
    }
}

/// Process-level settings channels inherit when their own config is silent.
#[derive(Debug, Clone)]
pub struct ChannelDefaults {
    /// Upper bound for a single outbound request.
    pub timeout: Duration,
    /// Timezone used for human-readable timestamps.
    pub timezone: Tz,
    pub resend_api_key: String,
    pub resend_from_email: String,
    pub resend_api_url: String,
}

impl Default for ChannelDefaults {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            timezone: chrono_tz::Asia::Shanghai,
            resend_api_key: String::new(),
            resend_from_email: String::new(),
            resend_api_url: RESEND_API_URL.to_string(),
        }
    }
}

impl ChannelDefaults {
    pub fn from_config(config: &Config) -> Self {
        let timezone = config.timezone.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                timezone = %config.timezone,
                "Unknown timezone, falling back to UTC"
            );
            chrono_tz::UTC
        });

        Self {
            timeout: Duration::from_secs(config.delivery.timeout_seconds.max(1)),
            timezone,
            resend_api_key: config.resend.api_key.clone(),
            resend_from_email: config.resend.from_email.clone(),
            resend_api_url: config.resend.api_url.clone(),
        }
    }
}

/// Builds a channel instance from its configuration.
///
/// Only stores parameters; no network I/O happens here.
pub fn build_channel(
    config: &ChannelConfig,
    defaults: &ChannelDefaults,
) -> Result<Box<dyn Channel>, ConfigError> {
    let channel: Box<dyn Channel> = match config {
        ChannelConfig::Feishu(c) => Box::new(FeishuChannel::from_config(c, defaults)?),
        ChannelConfig::ResendEmail(c) => Box::new(ResendEmailChannel::from_config(c, defaults)?),
    };
    Ok(channel)
}

/// Builds the HTTP client a channel uses for delivery.
pub(crate) fn http_client(name: &str, timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::Channel {
            channel: name.to_string(),
            reason: e.to_string(),
        })
}
