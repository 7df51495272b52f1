//! Process entrypoint shared by the `hr-subscriber` and `it-subscriber` binaries.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use emphub_infra::{BusConfig, service_bus};

use crate::config::{SubscriberConfig, SubscriberKind};
use crate::handler::SubscriberHandler;
use crate::host::SubscriberHost;
use crate::processor::LoggingProcessor;

/// Read config from the environment, connect, and poll until Ctrl-C.
pub async fn run(kind: SubscriberKind) -> anyhow::Result<()> {
    let config = SubscriberConfig::from_env(kind)?;
    let mut bus_config = BusConfig::from_env()?;
    bus_config.topic = config.topic.clone();

    let client = service_bus::connect(&bus_config, &[config.subscription.as_str()])
        .await
        .context("failed to connect to the message bus")?;

    let handler = SubscriberHandler::new(&config, Arc::new(LoggingProcessor::new(kind.name())));
    let handle = SubscriberHost::new(client, config, handler).spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!(subscriber = kind.name(), "shutdown requested");

    let stats = handle.shutdown().await;
    info!(subscriber = kind.name(), ?stats, "shutdown complete");
    Ok(())
}
