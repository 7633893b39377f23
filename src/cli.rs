//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged on top of
//! the configuration from the TOML file and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Fans subscription events out to registered HTTP callback endpoints.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Redis connection URL for the event channel.
    #[arg(long, value_name = "URL")]
    pub redis_url: Option<String>,

    /// Name of the pub/sub channel to subscribe to.
    #[arg(long, value_name = "NAME")]
    pub channel: Option<String>,

    /// MySQL connection URL for the callback registry.
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Delivery attempts per endpoint, including the first.
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Fixed delay between delivery attempts in milliseconds.
    #[arg(long, value_name = "MS")]
    pub retry_delay_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Serve Prometheus metrics on this address.
    #[arg(long, value_name = "ADDR")]
    pub metrics_listen: Option<SocketAddr>,

    /// Print the resolved configuration and exit.
    #[arg(long)]
    pub check_config: bool,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut redis = Dict::new();
        if let Some(url) = &self.redis_url {
            redis.insert("url".into(), Value::from(url.clone()));
        }
        if let Some(channel) = &self.channel {
            redis.insert("channel".into(), Value::from(channel.clone()));
        }
        if !redis.is_empty() {
            dict.insert("redis".into(), Value::from(redis));
        }

        if let Some(url) = &self.database_url {
            let mut database = Dict::new();
            database.insert("url".into(), Value::from(url.clone()));
            dict.insert("database".into(), Value::from(database));
        }

        let mut delivery = Dict::new();
        if let Some(attempts) = self.max_attempts {
            delivery.insert("max_attempts".into(), Value::from(attempts));
        }
        if let Some(delay) = self.retry_delay_ms {
            delivery.insert("retry_delay_ms".into(), Value::from(delay));
        }
        if !delivery.is_empty() {
            dict.insert("delivery".into(), Value::from(delivery));
        }

        // Passing an address implies the server should run.
        if let Some(addr) = self.metrics_listen {
            let mut metrics = Dict::new();
            metrics.insert("enabled".into(), Value::from(true));
            metrics.insert("listen_address".into(), Value::from(addr.to_string()));
            dict.insert("metrics".into(), Value::from(metrics));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
