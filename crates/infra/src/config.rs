//! Typed configuration loaded at the process edge.
//!
//! Only binaries call `from_env`; everything below `main` receives these structs
//! explicitly.

use std::time::Duration;

use anyhow::Context;

/// Parse an optional env value, falling back to `default` when unset.
pub fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}")),
        _ => Ok(default),
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Record store selection and connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `USE_PERSISTENT_STORES`: Postgres when true, in-memory otherwise.
    pub use_persistent_stores: bool,
    /// `DATABASE_URL`, required when persistent stores are enabled.
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

    pub fn in_memory() -> Self {
        Self {
            use_persistent_stores: false,
            database_url: None,
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let use_persistent_stores = env_or("USE_PERSISTENT_STORES", false)?;
        let database_url = env_opt("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
        }
        Ok(Self {
            use_persistent_stores,
            database_url,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", Self::DEFAULT_MAX_CONNECTIONS)?,
        })
    }
}

/// Message-bus connection and topic settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// `SB_CONNECTION_STRING`. A `redis://` URL selects the Redis Streams broker;
    /// unset selects the in-process broker.
    pub connection_string: Option<String>,
    /// `SB_TOPIC`: topic employee snapshots are published to.
    pub topic: String,
    /// Peek-lock duration for receivers.
    pub lock_duration: Duration,
    /// Broker-side delivery limit before automatic dead-lettering.
    pub max_delivery_count: u32,
}

impl BusConfig {
    pub const DEFAULT_TOPIC: &'static str = "employees";
    pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(60);
    pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

    pub fn in_memory(topic: impl Into<String>) -> Self {
        Self {
            connection_string: None,
            topic: topic.into(),
            lock_duration: Self::DEFAULT_LOCK_DURATION,
            max_delivery_count: Self::DEFAULT_MAX_DELIVERY_COUNT,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let topic = env_opt("SB_TOPIC").unwrap_or_else(|| Self::DEFAULT_TOPIC.to_string());
        let lock_ms: u64 = env_or(
            "SB_LOCK_DURATION_MS",
            Self::DEFAULT_LOCK_DURATION.as_millis() as u64,
        )?;
        let config = Self {
            connection_string: env_opt("SB_CONNECTION_STRING"),
            topic,
            lock_duration: Duration::from_millis(lock_ms),
            max_delivery_count: env_or("SB_MAX_DELIVERY_COUNT", Self::DEFAULT_MAX_DELIVERY_COUNT)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// A zero lock expires on receipt and a zero delivery limit dead-letters
    /// every message before its first delivery.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.lock_duration.is_zero() {
            anyhow::bail!("SB_LOCK_DURATION_MS must be greater than 0");
        }
        if self.max_delivery_count == 0 {
            anyhow::bail!("SB_MAX_DELIVERY_COUNT must be at least 1");
        }
        Ok(())
    }

    /// Whether the connection string points at Redis.
    pub fn is_redis(&self) -> bool {
        self.connection_string
            .as_deref()
            .is_some_and(|s| s.starts_with("redis://") || s.starts_with("rediss://"))
    }

    /// Connection string, failing with context when absent.
    pub fn require_connection_string(&self) -> anyhow::Result<&str> {
        self.connection_string
            .as_deref()
            .context("SB_CONNECTION_STRING must be set")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_is_detected_from_scheme() {
        let mut cfg = BusConfig::in_memory("employees");
        assert!(!cfg.is_redis());
        assert!(cfg.require_connection_string().is_err());

        cfg.connection_string = Some("redis://localhost:6379".into());
        assert!(cfg.is_redis());
        assert_eq!(cfg.require_connection_string().unwrap(), "redis://localhost:6379");
    }

    #[test]
    fn zero_lock_duration_is_rejected() {
        let cfg = BusConfig {
            lock_duration: Duration::ZERO,
            ..BusConfig::in_memory("employees")
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("SB_LOCK_DURATION_MS"));
    }

    #[test]
    fn zero_max_delivery_count_is_rejected() {
        let cfg = BusConfig {
            max_delivery_count: 0,
            ..BusConfig::in_memory("employees")
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("SB_MAX_DELIVERY_COUNT"));

        assert!(BusConfig::in_memory("employees").validate().is_ok());
    }

    #[test]
    fn env_or_uses_default_for_missing_key() {
        let value: u32 = env_or("EMPHUB_TEST_SURELY_UNSET_KEY", 42).unwrap();
        assert_eq!(value, 42);
    }
}
