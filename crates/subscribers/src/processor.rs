use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use emphub_core::EmployeeSnapshot;

/// Failure reported by a processor; decides whether the message is retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// Transient; the message goes back to the subscription for redelivery.
    #[error("retryable: {0}")]
    Retryable(String),

    /// Permanent; the message is dead-lettered immediately.
    #[error("terminal: {0}")]
    Terminal(String),
}

/// Downstream work performed for each employee snapshot a subscriber receives.
#[async_trait]
pub trait EmployeeProcessor: Send + Sync {
    async fn process(&self, snapshot: &EmployeeSnapshot) -> Result<(), ProcessingError>;
}

#[async_trait]
impl<P> EmployeeProcessor for Arc<P>
where
    P: EmployeeProcessor + ?Sized,
{
    async fn process(&self, snapshot: &EmployeeSnapshot) -> Result<(), ProcessingError> {
        (**self).process(snapshot).await
    }
}

/// Default processor: logs the snapshot and succeeds.
#[derive(Debug, Clone)]
pub struct LoggingProcessor {
    name: String,
}

impl LoggingProcessor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl EmployeeProcessor for LoggingProcessor {
    async fn process(&self, snapshot: &EmployeeSnapshot) -> Result<(), ProcessingError> {
        let employee = snapshot.employee();
        info!(
            subscriber = %self.name,
            employee_id = %employee.id_typed(),
            name = employee.name(),
            department = employee.department(),
            "employee snapshot processed"
        );
        Ok(())
    }
}
