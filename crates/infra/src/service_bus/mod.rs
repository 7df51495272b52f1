//! Broker wiring.
//!
//! The broker abstraction and the in-process broker live in `emphub-messaging`.
//! This module provides the Redis Streams broker and picks one from `BusConfig`.

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{RedisStreamsError, RedisStreamsServiceBus};

use std::sync::Arc;

use emphub_messaging::{InMemoryServiceBus, ServiceBusClient, ServiceBusError};

use crate::config::BusConfig;

/// Build the broker client described by `config`.
///
/// `subscriptions` are created on the configured topic up front, so messages
/// published before a subscriber first connects are retained for it.
pub async fn connect(
    config: &BusConfig,
    subscriptions: &[&str],
) -> Result<Arc<dyn ServiceBusClient>, ServiceBusError> {
    if config.is_redis() {
        #[cfg(feature = "redis")]
        {
            return connect_redis(config, subscriptions).await;
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                "SB_CONNECTION_STRING points at Redis but the redis feature is not enabled, falling back to in-memory"
            );
        }
    }

    Ok(in_memory(config, subscriptions)?)
}

/// In-process broker with the configured topic and subscriptions.
pub fn in_memory(
    config: &BusConfig,
    subscriptions: &[&str],
) -> Result<Arc<InMemoryServiceBus>, ServiceBusError> {
    let bus = InMemoryServiceBus::new()
        .with_lock_duration(config.lock_duration)
        .with_max_delivery_count(config.max_delivery_count);
    bus.create_topic(&config.topic)?;
    for subscription in subscriptions {
        bus.create_subscription(&config.topic, subscription)?;
    }
    Ok(Arc::new(bus))
}

#[cfg(feature = "redis")]
async fn connect_redis(
    config: &BusConfig,
    subscriptions: &[&str],
) -> Result<Arc<dyn ServiceBusClient>, ServiceBusError> {
    let url = config
        .connection_string
        .as_deref()
        .ok_or_else(|| ServiceBusError::Connection("missing connection string".to_string()))?;

    let bus = RedisStreamsServiceBus::new(url, None)?
        .with_lock_duration(config.lock_duration)
        .with_max_delivery_count(config.max_delivery_count);
    for subscription in subscriptions {
        bus.ensure_subscription(&config.topic, subscription).await?;
    }
    Ok(Arc::new(bus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use emphub_messaging::EntityPath;

    #[tokio::test]
    async fn in_memory_bus_has_topic_and_subscriptions() {
        let config = BusConfig::in_memory("employees");
        let bus = in_memory(&config, &["hr", "it"]).unwrap();

        for sub in ["hr", "it"] {
            assert_eq!(
                bus.message_count(&EntityPath::subscription("employees", sub)).unwrap(),
                0
            );
        }
    }

    #[tokio::test]
    async fn connect_without_connection_string_is_in_memory() {
        let config = BusConfig::in_memory("employees");
        let bus = connect(&config, &["hr"]).await.unwrap();
        assert!(bus.create_sender("employees").await.is_ok());
    }
}
