//! Command-Line Interface (CLI) argument parsing.
//!
//! Arguments are parsed with `clap` and merged on top of the file and
//! environment configuration through the `figment::Provider` impl below.

use clap::Parser;
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Webhook relay with source- and label-based routing.
#[derive(Parser, Debug, Default, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the YAML routing configuration.
    #[arg(short, long, value_name = "FILE")]
    pub routes: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(routes) = &self.routes {
            dict.insert(
                "routes_config".into(),
                Value::from(routes.display().to_string()),
            );
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut server = Dict::new();
        if let Some(host) = &self.host {
            server.insert("host".into(), Value::from(host.clone()));
        }
        if let Some(port) = self.port {
            server.insert("port".into(), Value::from(u64::from(port)));
        }
        if !server.is_empty() {
            dict.insert("server".into(), Value::Dict(Tag::Default, server));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
