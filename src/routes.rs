//! Routing configuration: ordered routes, their match predicates, and the
//! typed channel configurations attached to each route.
//!
//! The file is YAML and is loaded once at startup. Unknown channel types are
//! rejected here, at load time, rather than when an event is dispatched.

use crate::core::Labels;
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Value shown instead of secrets when a configuration is exposed.
const REDACTED: &str = "***";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("routes config not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read routes config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse routes config: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("failed to load template {}: {reason}", .path.display())]
    Template { path: PathBuf, reason: String },

    #[error("invalid channel '{channel}': {reason}")]
    Channel { channel: String, reason: String },
}

/// Predicate over an event's source and labels.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouteMatcher {
    /// Source to match. Empty matches any source.
    pub source: String,
    /// Labels that must all be present with equal values.
    pub labels: Labels,
}

impl RouteMatcher {
    /// Exact, case-sensitive match. Extra labels on the event are ignored.
    pub fn matches(&self, source: &str, labels: &Labels) -> bool {
        if !self.source.is_empty() && self.source != source {
            return false;
        }
        self.labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

/// Feishu (Lark) webhook bot channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeishuChannelConfig {
    pub webhook_url: String,
    /// Signing secret. Empty disables signing.
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub name: String,
}

/// Resend transactional e-mail channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResendEmailChannelConfig {
    /// Recipients. A single string is accepted as a one-element list.
    #[serde(default, deserialize_with = "string_or_list")]
    pub to: Vec<String>,
    /// Sender, e.g. `Acme <onboarding@resend.dev>`.
    #[serde(default, rename = "from")]
    pub from_email: String,
    #[serde(default)]
    pub subject_prefix: String,
    /// Optional Jinja subject template.
    #[serde(default)]
    pub subject_template: String,
    /// Optional Jinja HTML template file. The built-in template is used when empty.
    #[serde(default)]
    pub template_path: String,
    #[serde(default)]
    pub reply_to: String,
    /// API key. Falls back to the process-level Resend key when empty.
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub name: String,
}

/// A channel configuration, discriminated by its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    Feishu(FeishuChannelConfig),
    ResendEmail(ResendEmailChannelConfig),
}

impl ChannelConfig {
    /// The `type` discriminant as written in the config file.
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelConfig::Feishu(_) => "feishu",
            ChannelConfig::ResendEmail(_) => "resend_email",
        }
    }

    /// Returns a copy with secrets and API keys masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        match &mut config {
            ChannelConfig::Feishu(c) => {
                c.webhook_url = mask_webhook_url(&c.webhook_url);
                if !c.secret.is_empty() {
                    c.secret = REDACTED.to_string();
                }
            }
            ChannelConfig::ResendEmail(c) if !c.api_key.is_empty() => {
                c.api_key = REDACTED.to_string()
            }
            _ => {}
        }
        config
    }
}

/// Masks the last path segment of a webhook URL, which carries the bot token.
fn mask_webhook_url(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let Ok(mut url) = reqwest::Url::parse(raw) else {
        return REDACTED.to_string();
    };
    let masked = match url.path().rsplit_once('/') {
        Some((prefix, token)) if !token.is_empty() => Some(format!("{}/{}", prefix, REDACTED)),
        _ => None,
    };
    if let Some(path) = masked {
        url.set_path(&path);
    }
    url.set_query(None);
    url.to_string()
}

/// A single routing rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Route {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "match")]
    pub matcher: RouteMatcher,
    /// Delivery targets. An empty list discards matching events.
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl Route {
    pub fn matches(&self, source: &str, labels: &Labels) -> bool {
        self.matcher.matches(source, labels)
    }

    /// The route's name, or `route_<index>` when it has none.
    pub fn key(&self, index: usize) -> String {
        if self.name.is_empty() {
            format!("route_{}", index)
        } else {
            self.name.clone()
        }
    }
}

/// The complete, ordered routing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoutesConfig {
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl RoutesConfig {
    /// Loads the routing configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parses a routing configuration from YAML text. Empty text yields no routes.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(content)?)
    }

    /// Returns the first route matching the source and labels.
    pub fn find_matching_route(&self, source: &str, labels: &Labels) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(source, labels))
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<StringOrList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(StringOrList::One(s)) => vec![s],
        Some(StringOrList::Many(v)) => v,
    })
}
