//! Subscriber host: pulls one message per invocation from a subscription and
//! runs it through the handler.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use emphub_messaging::{EntityPath, MessageReceiver, ServiceBusClient};

use crate::config::SubscriberConfig;
use crate::handler::{HandlerOutcome, SubscriberError, SubscriberHandler};

/// Result of one `run_once` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The subscription had nothing to deliver.
    Idle,
    Handled(HandlerOutcome),
}

/// Host runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    pub received: u64,
    pub completed: u64,
    pub abandoned: u64,
    pub dead_lettered: u64,
    pub errors: u64,
}

impl SubscriberStats {
    fn record(&mut self, result: &Result<RunOutcome, SubscriberError>) {
        match result {
            Ok(RunOutcome::Idle) => {}
            Ok(RunOutcome::Handled(outcome)) => {
                self.received += 1;
                match outcome {
                    HandlerOutcome::Completed { .. } => self.completed += 1,
                    HandlerOutcome::Abandoned { .. } => self.abandoned += 1,
                    HandlerOutcome::DeadLettered { .. } => self.dead_lettered += 1,
                }
            }
            Err(_) => self.errors += 1,
        }
    }
}

pub struct SubscriberHost {
    client: Arc<dyn ServiceBusClient>,
    config: SubscriberConfig,
    handler: SubscriberHandler,
    stats: Arc<Mutex<SubscriberStats>>,
}

impl SubscriberHost {
    pub fn new(
        client: Arc<dyn ServiceBusClient>,
        config: SubscriberConfig,
        handler: SubscriberHandler,
    ) -> Self {
        Self {
            client,
            config,
            handler,
            stats: Arc::new(Mutex::new(SubscriberStats::default())),
        }
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    pub fn stats(&self) -> SubscriberStats {
        read_stats(&self.stats)
    }

    /// Process at most one message from the configured subscription.
    ///
    /// The receiver is scoped to this call and closed on every path.
    pub async fn run_once(&self) -> Result<RunOutcome, SubscriberError> {
        let path = EntityPath::subscription(&self.config.topic, &self.config.subscription);
        let mut receiver = self.client.create_receiver(path).await?;
        let result = self.receive_and_handle(receiver.as_mut()).await;
        let closed = receiver.close().await;

        let outcome = result?;
        closed?;
        Ok(outcome)
    }

    async fn receive_and_handle(
        &self,
        receiver: &mut dyn MessageReceiver,
    ) -> Result<RunOutcome, SubscriberError> {
        let Some(message) = receiver.receive_one().await? else {
            return Ok(RunOutcome::Idle);
        };
        let outcome = self.handler.handle(receiver, &message).await?;
        Ok(RunOutcome::Handled(outcome))
    }

    /// Poll until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// Sleeps `poll_interval` after an empty poll or an error; goes straight on
    /// to the next message after a handled one.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            subscriber = %self.config.name,
            topic = %self.config.topic,
            subscription = %self.config.subscription,
            "subscriber started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let result = self.run_once().await;
            if let Ok(mut stats) = self.stats.lock() {
                stats.record(&result);
            }

            let idle = match result {
                Ok(RunOutcome::Handled(outcome)) => {
                    debug!(subscriber = %self.config.name, outcome = ?outcome, "message handled");
                    false
                }
                Ok(RunOutcome::Idle) => true,
                Err(err) => {
                    error!(subscriber = %self.config.name, error = %err, "subscriber run failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!(subscriber = %self.config.name, stats = ?self.stats(), "subscriber stopped");
    }

    /// Run the poll loop on a background task.
    pub fn spawn(self) -> SubscriberHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = self.stats.clone();
        let join = tokio::spawn(async move { self.run(shutdown_rx).await });

        SubscriberHandle {
            shutdown: shutdown_tx,
            join,
            stats,
        }
    }
}

/// Handle to control a running subscriber.
#[derive(Debug)]
pub struct SubscriberHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<SubscriberStats>>,
}

impl SubscriberHandle {
    /// Request graceful shutdown and wait for the loop to stop.
    pub async fn shutdown(self) -> SubscriberStats {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.join.await {
            error!(error = %err, "subscriber task ended abnormally");
        }
        read_stats(&self.stats)
    }

    pub fn stats(&self) -> SubscriberStats {
        read_stats(&self.stats)
    }
}

fn read_stats(stats: &Mutex<SubscriberStats>) -> SubscriberStats {
    stats.lock().map(|s| s.clone()).unwrap_or_default()
}
