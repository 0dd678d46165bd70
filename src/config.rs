//! Configuration management for Bullet
//!
//! This module defines the main `Config` struct and its sub-structs. Settings
//! are layered with `figment`: built-in defaults, then an optional
//! `bullet.toml`, then `BULLET_`-prefixed environment variables, then
//! command-line arguments.
//!
//! Routing rules live in a separate YAML file (see [`crate::routes`]); this
//! file only points at it.

use crate::channels::RESEND_API_URL;
use crate::cli::Cli;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::{fmt, net::SocketAddr, path::PathBuf};

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "bullet.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Path to the YAML routing configuration.
    pub routes_config: PathBuf,
    /// IANA timezone used when rendering timestamps, e.g. "Asia/Shanghai".
    pub timezone: String,
    /// Configuration for the inbound HTTP server.
    pub server: ServerConfig,
    /// Configuration for outbound delivery.
    pub delivery: DeliveryConfig,
    /// Process-wide defaults for the Resend e-mail channel.
    pub resend: ResendConfig,
    /// Configuration for the Prometheus metrics endpoint.
    pub metrics: MetricsConfig,
}

/// Configuration for the inbound HTTP server.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// How a route's channels are attempted.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FanOut {
    /// One channel at a time, in declared order.
    #[default]
    Sequential,
    /// All channels at once.
    Concurrent,
}

impl fmt::Display for FanOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanOut::Sequential => write!(f, "sequential"),
            FanOut::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Configuration for outbound delivery.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeliveryConfig {
    /// Timeout for a single outbound request, in seconds.
    pub timeout_seconds: u64,
    pub fan_out: FanOut,
}

/// Defaults for the Resend e-mail channel.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResendConfig {
    pub api_key: String,
    pub from_email: String,
    pub api_url: String,
}

/// Configuration for the Prometheus metrics endpoint.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
}

impl Config {
    /// Loads the application configuration by layering all sources.
    ///
    /// A missing config file is not an error; defaults and environment
    /// variables still apply.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // e.g. BULLET_LOG_LEVEL=debug, BULLET_SERVER__PORT=8080
            .merge(Env::prefixed("BULLET_").split("__"))
            .merge(cli.clone())
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make every delivery fail.
    pub fn validate(&self) -> Result<()> {
        if self.delivery.timeout_seconds == 0 {
            bail!("delivery.timeout_seconds must be at least 1");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            routes_config: PathBuf::from("routes.yaml"),
            timezone: "Asia/Shanghai".to_string(),
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5032,
            },
            delivery: DeliveryConfig {
                timeout_seconds: 30,
                fan_out: FanOut::Sequential,
            },
            resend: ResendConfig {
                api_key: String::new(),
                from_email: String::new(),
                api_url: RESEND_API_URL.to_string(),
            },
            metrics: MetricsConfig {
                enabled: false,
                listen_address: SocketAddr::from(([127, 0, 0, 1], 9090)),
            },
        }
    }
}
