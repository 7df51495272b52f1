use thiserror::Error;

/// Errors surfaced by brokers and by the dispatch helper.
///
/// Payloads are plain strings so that every broker implementation (in-memory,
/// Redis, ...) can map its own failures without leaking its error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceBusError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("settlement failed: {0}")]
    Settle(String),

    /// The peek-lock expired or the message was already settled.
    #[error("message lock lost for {message_id}")]
    LockLost { message_id: String },

    #[error("handle already closed")]
    Closed,

    /// Body was not valid UTF-8; the message was left uncompleted.
    #[error("message {message_id} has a non-text body")]
    InvalidBody { message_id: String },

    /// The caller's handler failed; the message was left uncompleted.
    #[error("handler failed for message {message_id}: {reason}")]
    Handler { message_id: String, reason: String },

    /// Internal lock poisoning in an in-process broker.
    #[error("broker state poisoned")]
    Poisoned,
}
