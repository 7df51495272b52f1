//! Message-bus plumbing: broker abstraction, in-memory broker, and the
//! one-message-per-call dispatch helper.

pub mod bus;
pub mod entity;
pub mod error;
pub mod helper;
pub mod in_memory_bus;
pub mod message;

pub use bus::{MessageReceiver, MessageSender, ServiceBusClient};
pub use entity::{EntityPath, SubQueue};
pub use error::ServiceBusError;
pub use helper::{ReceiveOutcome, ServiceBusHelper};
pub use in_memory_bus::{InMemoryServiceBus, DEFAULT_LOCK_DURATION, DEFAULT_MAX_DELIVERY_COUNT};
pub use message::{OutgoingMessage, ReceivedMessage};
