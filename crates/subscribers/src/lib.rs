//! Topic subscribers: the shared handler policy, the processing capability, and
//! the host loop that feeds one message at a time into the handler.

pub mod config;
pub mod handler;
pub mod host;
pub mod processor;
pub mod runtime;

pub use config::{SubscriberConfig, SubscriberKind};
pub use handler::{DeadLetterReason, HandlerOutcome, SubscriberError, SubscriberHandler};
pub use host::{RunOutcome, SubscriberHandle, SubscriberHost, SubscriberStats};
pub use processor::{EmployeeProcessor, LoggingProcessor, ProcessingError};
