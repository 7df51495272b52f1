//! Per-message subscriber state machine.
//!
//! One message = one run:
//! received -> decoded -> processed -> completed, or one of the failure exits
//! (abandoned for bus-driven redelivery, or dead-lettered with a reason code).

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use emphub_core::EmployeeSnapshot;
use emphub_messaging::{MessageReceiver, ReceivedMessage, ServiceBusError};

use crate::config::SubscriberConfig;
use crate::processor::{EmployeeProcessor, ProcessingError};

/// Application property carrying the snapshot schema marker.
pub const SCHEMA_VERSION_PROPERTY: &str = "schema_version";

/// Reason codes written to dead-lettered messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    MalformedPayload,
    UnsupportedSchema,
    MaxAttemptsExceeded,
    ProcessingFailed,
}

impl DeadLetterReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DeadLetterReason::MalformedPayload => "MalformedPayload",
            DeadLetterReason::UnsupportedSchema => "UnsupportedSchema",
            DeadLetterReason::MaxAttemptsExceeded => "MaxAttemptsExceeded",
            DeadLetterReason::ProcessingFailed => "ProcessingFailed",
        }
    }
}

impl core::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single message left the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Completed { message_id: String },
    Abandoned { message_id: String, delivery_count: u32 },
    DeadLettered { message_id: String, reason: DeadLetterReason },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriberError {
    /// Opening, receiving from, or closing the subscription failed.
    #[error("bus error: {0}")]
    Bus(#[from] ServiceBusError),

    /// The message could not be settled; its lock timeout governs redelivery.
    #[error("failed to {action} message {message_id}: {source}")]
    Settle {
        message_id: String,
        action: &'static str,
        #[source]
        source: ServiceBusError,
    },
}

enum Decoded {
    Snapshot(EmployeeSnapshot),
    Rejected(DeadLetterReason, String),
}

/// Shared HR/IT handler: decode, process, then settle according to the failure
/// policy.
#[derive(Clone)]
pub struct SubscriberHandler {
    name: String,
    max_attempts: u32,
    processor: Arc<dyn EmployeeProcessor>,
}

impl SubscriberHandler {
    pub fn new(config: &SubscriberConfig, processor: Arc<dyn EmployeeProcessor>) -> Self {
        Self {
            name: config.name.clone(),
            max_attempts: config.max_attempts,
            processor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run one received message through the state machine and settle it on
    /// `receiver`.
    #[instrument(
        skip(self, receiver, message),
        fields(subscriber = %self.name, message_id = %message.message_id, delivery_count = message.delivery_count),
        err
    )]
    pub async fn handle(
        &self,
        receiver: &mut dyn MessageReceiver,
        message: &ReceivedMessage,
    ) -> Result<HandlerOutcome, SubscriberError> {
        info!(
            content_type = message.content_type.as_deref().unwrap_or(""),
            body = %String::from_utf8_lossy(&message.body),
            "message received"
        );

        let snapshot = match decode(message) {
            Decoded::Snapshot(snapshot) => snapshot,
            Decoded::Rejected(reason, description) => {
                return self.dead_letter(receiver, message, reason, description).await;
            }
        };

        match self.processor.process(&snapshot).await {
            Ok(()) => {
                settle(receiver.complete(message).await, message, "complete")?;
                info!("message completed");
                Ok(HandlerOutcome::Completed {
                    message_id: message.message_id.clone(),
                })
            }
            Err(ProcessingError::Retryable(reason)) if message.delivery_count < self.max_attempts => {
                warn!(reason = %reason, max_attempts = self.max_attempts, "retryable failure, abandoning");
                settle(receiver.abandon(message).await, message, "abandon")?;
                Ok(HandlerOutcome::Abandoned {
                    message_id: message.message_id.clone(),
                    delivery_count: message.delivery_count,
                })
            }
            Err(ProcessingError::Retryable(reason)) => {
                let description = format!(
                    "gave up after {} deliveries: {reason}",
                    message.delivery_count
                );
                self.dead_letter(receiver, message, DeadLetterReason::MaxAttemptsExceeded, description)
                    .await
            }
            Err(ProcessingError::Terminal(reason)) => {
                self.dead_letter(receiver, message, DeadLetterReason::ProcessingFailed, reason)
                    .await
            }
        }
    }

    async fn dead_letter(
        &self,
        receiver: &mut dyn MessageReceiver,
        message: &ReceivedMessage,
        reason: DeadLetterReason,
        description: String,
    ) -> Result<HandlerOutcome, SubscriberError> {
        warn!(reason = %reason, description = %description, "dead-lettering message");
        settle(
            receiver.dead_letter(message, reason.as_str(), &description).await,
            message,
            "dead-letter",
        )?;
        Ok(HandlerOutcome::DeadLettered {
            message_id: message.message_id.clone(),
            reason,
        })
    }
}

fn decode(message: &ReceivedMessage) -> Decoded {
    // A missing marker is read as the current version.
    if let Some(version) = message.property(SCHEMA_VERSION_PROPERTY) {
        if version != EmployeeSnapshot::SCHEMA_VERSION {
            return Decoded::Rejected(
                DeadLetterReason::UnsupportedSchema,
                format!("schema version {version:?} is not supported"),
            );
        }
    }

    let body = match message.body_as_str() {
        Ok(body) => body,
        Err(e) => {
            return Decoded::Rejected(
                DeadLetterReason::MalformedPayload,
                format!("body is not UTF-8: {e}"),
            );
        }
    };

    match EmployeeSnapshot::from_json(body) {
        Ok(snapshot) => Decoded::Snapshot(snapshot),
        Err(e) => Decoded::Rejected(
            DeadLetterReason::MalformedPayload,
            format!("body is not an employee snapshot: {e}"),
        ),
    }
}

fn settle(
    result: Result<(), ServiceBusError>,
    message: &ReceivedMessage,
    action: &'static str,
) -> Result<(), SubscriberError> {
    result.map_err(|source| {
        error!(action, error = %source, "settlement failed");
        SubscriberError::Settle {
            message_id: message.message_id.clone(),
            action,
            source,
        }
    })
}
