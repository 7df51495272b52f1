//! Broker abstraction (mechanics only).
//!
//! A broker hands out short-lived **senders** bound to one entity (queue or
//! topic) and **receivers** bound to one `EntityPath`. Receivers use
//! peek-lock semantics:
//!
//! - `receive_one` locks a single message for the broker's lock duration and
//!   increments its delivery count
//! - `complete` removes it
//! - `abandon` releases the lock so it can be redelivered immediately
//! - `dead_letter` moves it to the entity's dead-letter sub-queue
//!
//! A message that is neither completed nor abandoned becomes visible again once
//! its lock expires (at-least-once delivery). Consumers must be idempotent.
//!
//! Handles must be closed by whoever opened them; implementations also release
//! their resources on drop so a panic or a cancelled future never leaks one.

use std::sync::Arc;

use async_trait::async_trait;

use crate::entity::EntityPath;
use crate::error::ServiceBusError;
use crate::message::{OutgoingMessage, ReceivedMessage};

/// Factory for senders and receivers on one broker namespace.
#[async_trait]
pub trait ServiceBusClient: Send + Sync {
    /// Open a sender bound to a queue or topic.
    async fn create_sender(&self, entity: &str) -> Result<Box<dyn MessageSender>, ServiceBusError>;

    /// Open a peek-lock receiver on a queue, subscription, or dead-letter sub-queue.
    async fn create_receiver(
        &self,
        path: EntityPath,
    ) -> Result<Box<dyn MessageReceiver>, ServiceBusError>;
}

#[async_trait]
pub trait MessageSender: Send {
    fn entity(&self) -> &str;

    /// Send one message; returns the message id actually used.
    async fn send(&mut self, message: OutgoingMessage) -> Result<String, ServiceBusError>;

    /// Release the sender. Idempotent.
    async fn close(&mut self) -> Result<(), ServiceBusError>;
}

#[async_trait]
pub trait MessageReceiver: Send {
    fn path(&self) -> &EntityPath;

    /// Lock and return one available message, or `None` when nothing is
    /// available right now. Never waits for new messages beyond a short poll.
    async fn receive_one(&mut self) -> Result<Option<ReceivedMessage>, ServiceBusError>;

    async fn complete(&mut self, message: &ReceivedMessage) -> Result<(), ServiceBusError>;

    async fn abandon(&mut self, message: &ReceivedMessage) -> Result<(), ServiceBusError>;

    async fn dead_letter(
        &mut self,
        message: &ReceivedMessage,
        reason: &str,
        description: &str,
    ) -> Result<(), ServiceBusError>;

    /// Release the receiver. Idempotent.
    async fn close(&mut self) -> Result<(), ServiceBusError>;
}

#[async_trait]
impl<B> ServiceBusClient for Arc<B>
where
    B: ServiceBusClient + ?Sized,
{
    async fn create_sender(&self, entity: &str) -> Result<Box<dyn MessageSender>, ServiceBusError> {
        (**self).create_sender(entity).await
    }

    async fn create_receiver(
        &self,
        path: EntityPath,
    ) -> Result<Box<dyn MessageReceiver>, ServiceBusError> {
        (**self).create_receiver(path).await
    }
}
