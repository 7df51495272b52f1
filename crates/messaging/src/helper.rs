//! One-message-per-call dispatch helper.
//!
//! Every operation opens its own sender/receiver, does exactly one unit of work,
//! and closes the handle before returning, whatever the outcome. A message is
//! completed only after the caller's handler succeeded.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::bus::{MessageReceiver, MessageSender, ServiceBusClient};
use crate::entity::EntityPath;
use crate::error::ServiceBusError;
use crate::message::{OutgoingMessage, ReceivedMessage};

/// Result of a single receive-and-handle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Nothing was available; the handler was not invoked.
    Empty,
    /// The handler succeeded and the message was completed.
    Completed { message_id: String },
}

#[derive(Clone)]
pub struct ServiceBusHelper {
    client: Arc<dyn ServiceBusClient>,
}

impl ServiceBusHelper {
    pub fn new(client: Arc<dyn ServiceBusClient>) -> Self {
        Self { client }
    }

    /// Send a UTF-8 text payload to a queue or topic; returns the message id.
    pub async fn send(
        &self,
        destination: &str,
        payload: impl Into<String>,
    ) -> Result<String, ServiceBusError> {
        self.send_message(destination, OutgoingMessage::text(payload))
            .await
    }

    /// Send a fully specified message to a queue or topic; returns the message id.
    #[instrument(skip(self, message), err)]
    pub async fn send_message(
        &self,
        destination: &str,
        message: OutgoingMessage,
    ) -> Result<String, ServiceBusError> {
        let mut sender = self.client.create_sender(destination).await?;
        let sent = sender.send(message).await;
        let closed = close_sender(sender.as_mut()).await;

        let message_id = sent?;
        closed?;
        info!(message_id = %message_id, "message sent");
        Ok(message_id)
    }

    /// Receive at most one message from a queue and hand its body to `handler`.
    pub async fn receive_from_queue<F, Fut, E>(
        &self,
        queue: &str,
        handler: F,
    ) -> Result<ReceiveOutcome, ServiceBusError>
    where
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<(), E>> + Send,
        E: Display + Send,
    {
        self.receive_and_complete(EntityPath::queue(queue), handler)
            .await
    }

    /// Receive at most one message from a topic subscription and hand its body to `handler`.
    pub async fn receive_from_subscription<F, Fut, E>(
        &self,
        topic: &str,
        subscription: &str,
        handler: F,
    ) -> Result<ReceiveOutcome, ServiceBusError>
    where
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<(), E>> + Send,
        E: Display + Send,
    {
        self.receive_and_complete(EntityPath::subscription(topic, subscription), handler)
            .await
    }

    /// Peek one message from the dead-letter sub-queue of a queue (`None`) or
    /// of a topic subscription (`Some`). The message is logged and returned,
    /// never completed.
    #[instrument(skip(self), err)]
    pub async fn receive_dead_letter(
        &self,
        entity: &str,
        subscription: Option<&str>,
    ) -> Result<Option<ReceivedMessage>, ServiceBusError> {
        let path = match subscription {
            Some(sub) => EntityPath::subscription(entity, sub),
            None => EntityPath::queue(entity),
        }
        .dead_letter();

        let mut receiver = self.client.create_receiver(path).await?;
        let received = receiver.receive_one().await;
        let closed = close_receiver(receiver.as_mut()).await;

        let message = received?;
        closed?;
        if let Some(msg) = &message {
            warn!(
                message_id = %msg.message_id,
                reason = msg.dead_letter_reason.as_deref().unwrap_or(""),
                description = msg.dead_letter_description.as_deref().unwrap_or(""),
                body = %String::from_utf8_lossy(&msg.body),
                "dead-lettered message"
            );
        }
        Ok(message)
    }

    #[instrument(skip(self, path, handler), fields(entity = %path), err)]
    async fn receive_and_complete<F, Fut, E>(
        &self,
        path: EntityPath,
        handler: F,
    ) -> Result<ReceiveOutcome, ServiceBusError>
    where
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<(), E>> + Send,
        E: Display + Send,
    {
        let mut receiver = self.client.create_receiver(path).await?;
        let outcome = handle_one(receiver.as_mut(), handler).await;
        let closed = close_receiver(receiver.as_mut()).await;

        let outcome = outcome?;
        closed?;
        Ok(outcome)
    }
}

async fn handle_one<F, Fut, E>(
    receiver: &mut dyn MessageReceiver,
    handler: F,
) -> Result<ReceiveOutcome, ServiceBusError>
where
    F: FnOnce(String) -> Fut + Send,
    Fut: Future<Output = Result<(), E>> + Send,
    E: Display + Send,
{
    let Some(message) = receiver.receive_one().await? else {
        return Ok(ReceiveOutcome::Empty);
    };

    info!(
        message_id = %message.message_id,
        content_type = message.content_type.as_deref().unwrap_or(""),
        delivery_count = message.delivery_count,
        "message received"
    );

    let body = message
        .body_as_str()
        .map_err(|_| ServiceBusError::InvalidBody {
            message_id: message.message_id.clone(),
        })?
        .to_string();

    handler(body)
        .await
        .map_err(|e| ServiceBusError::Handler {
            message_id: message.message_id.clone(),
            reason: e.to_string(),
        })?;

    receiver.complete(&message).await?;
    Ok(ReceiveOutcome::Completed {
        message_id: message.message_id,
    })
}

async fn close_sender(sender: &mut dyn MessageSender) -> Result<(), ServiceBusError> {
    let entity = sender.entity().to_string();
    sender.close().await.inspect_err(|e| {
        warn!(entity = %entity, error = %e, "failed to close sender");
    })
}

async fn close_receiver(receiver: &mut dyn MessageReceiver) -> Result<(), ServiceBusError> {
    let path = receiver.path().to_string();
    receiver.close().await.inspect_err(|e| {
        warn!(entity = %path, error = %e, "failed to close receiver");
    })
}
