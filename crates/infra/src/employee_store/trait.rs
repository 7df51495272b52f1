use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use emphub_core::{Employee, ValidEmployee};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A persisted row no longer satisfies the domain rules.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store error: {0}")]
    Other(String),
}

/// Persistence for employee records.
///
/// Only `ValidEmployee` can be inserted, so nothing reaches a store without
/// passing validation first.
#[async_trait]
pub trait EmployeeStore: Send + Sync {
    /// Persist a new record and return it with its assigned id.
    async fn insert(&self, employee: ValidEmployee) -> Result<Employee, StoreError>;

    /// Every record, ordered by id.
    async fn list(&self) -> Result<Vec<Employee>, StoreError>;
}

#[async_trait]
impl<S> EmployeeStore for Arc<S>
where
    S: EmployeeStore + ?Sized,
{
    async fn insert(&self, employee: ValidEmployee) -> Result<Employee, StoreError> {
        (**self).insert(employee).await
    }

    async fn list(&self) -> Result<Vec<Employee>, StoreError> {
        (**self).list().await
    }
}
