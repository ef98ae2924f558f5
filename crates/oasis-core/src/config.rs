// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::routing::{DEFAULT_TOPIC_PREFIX, NodePoolEntry};

/// Oasis API configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL
    pub database_url: String,
    /// REST listener address
    pub api_addr: SocketAddr,
    /// Upper bound for collection page sizes
    pub max_limit: u32,
    /// Topic prefix nodepool agents listen under
    pub agent_topic: String,
    /// Reply timeout for synchronous agent calls
    pub rpc_timeout: Duration,
    /// QUIC ingress of the message fabric
    pub bus_addr: SocketAddr,
    /// Skip TLS verification towards the fabric (development only)
    pub bus_skip_cert_verification: bool,
    /// Statically configured nodepools
    pub nodepools: Vec<NodePoolEntry>,
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `OASIS_DATABASE_URL`: SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `OASIS_API_HOST` / `OASIS_API_PORT`: REST listener (default: 127.0.0.1:9417)
    /// - `OASIS_API_MAX_LIMIT`: max page size (default: 1000)
    /// - `OASIS_AGENT_TOPIC`: agent topic prefix (default: oasis-agent)
    /// - `OASIS_RPC_TIMEOUT_MS`: call timeout (default: 60000)
    /// - `OASIS_BUS_ADDR`: fabric ingress (default: 127.0.0.1:7100)
    /// - `OASIS_BUS_SKIP_CERT_VERIFICATION`: `true` to disable TLS checks (default: false)
    /// - `OASIS_NODEPOOLS`: `np-1,np-2@10.0.0.5:7101` (default: empty)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("OASIS_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("OASIS_DATABASE_URL"))?;

        let api_host: IpAddr = var_or("OASIS_API_HOST", "127.0.0.1")
            .parse()
            .map_err(|_| ConfigError::Invalid("OASIS_API_HOST", "must be an IP address"))?;

        let api_port: u16 = var_or("OASIS_API_PORT", "9417")
            .parse()
            .map_err(|_| ConfigError::Invalid("OASIS_API_PORT", "must be a valid port number"))?;

        let max_limit: u32 = var_or("OASIS_API_MAX_LIMIT", "1000")
            .parse()
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or(ConfigError::Invalid(
                "OASIS_API_MAX_LIMIT",
                "must be a positive integer",
            ))?;

        let agent_topic = var_or("OASIS_AGENT_TOPIC", DEFAULT_TOPIC_PREFIX);
        if agent_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("OASIS_AGENT_TOPIC", "must not be empty"));
        }

        let rpc_timeout_ms: u64 = var_or("OASIS_RPC_TIMEOUT_MS", "60000")
            .parse()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or(ConfigError::Invalid(
                "OASIS_RPC_TIMEOUT_MS",
                "must be a positive number of milliseconds",
            ))?;

        let bus_addr: SocketAddr = var_or("OASIS_BUS_ADDR", "127.0.0.1:7100")
            .parse()
            .map_err(|_| ConfigError::Invalid("OASIS_BUS_ADDR", "must be a socket address"))?;

        let bus_skip_cert_verification = match var_or("OASIS_BUS_SKIP_CERT_VERIFICATION", "false")
            .to_ascii_lowercase()
            .as_str()
        {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" | "" => false,
            _ => {
                return Err(ConfigError::Invalid(
                    "OASIS_BUS_SKIP_CERT_VERIFICATION",
                    "must be true or false",
                ));
            }
        };

        let nodepools = NodePoolEntry::parse_list(&var_or("OASIS_NODEPOOLS", "")).map_err(|_| {
            ConfigError::Invalid(
                "OASIS_NODEPOOLS",
                "expected comma-separated id[@host:port] entries",
            )
        })?;

        Ok(Self {
            database_url,
            api_addr: SocketAddr::new(api_host, api_port),
            max_limit,
            agent_topic,
            rpc_timeout: Duration::from_millis(rpc_timeout_ms),
            bus_addr,
            bus_skip_cert_verification,
            nodepools,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
