use std::net::SocketAddr;

use emphub_infra::config::env_or;
use emphub_infra::{BusConfig, DatabaseConfig};

/// API process configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `API_BIND_ADDR`.
    pub bind_addr: SocketAddr,
    pub database: DatabaseConfig,
    pub bus: BusConfig,
    /// `SB_SUBSCRIPTIONS`: subscriptions provisioned on the topic at startup.
    pub subscriptions: Vec<String>,
}

impl ApiConfig {
    pub const DEFAULT_BIND_ADDR: &'static str = "0.0.0.0:8080";
    pub const DEFAULT_SUBSCRIPTIONS: &'static str = "hr,it";

    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr: SocketAddr = env_or(
            "API_BIND_ADDR",
            Self::DEFAULT_BIND_ADDR.parse::<SocketAddr>()?,
        )?;
        let subscriptions: String = env_or("SB_SUBSCRIPTIONS", Self::DEFAULT_SUBSCRIPTIONS.to_string())?;

        Ok(Self {
            bind_addr,
            database: DatabaseConfig::from_env()?,
            bus: BusConfig::from_env()?,
            subscriptions: parse_list(&subscriptions),
        })
    }

    pub fn subscription_names(&self) -> Vec<&str> {
        self.subscriptions.iter().map(String::as_str).collect()
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
