//! Service wiring: record store, broker client, and the employee use cases.

use std::sync::Arc;

use thiserror::Error;
use tracing::{Span, info, instrument};

use emphub_core::{DomainError, Employee, EmployeeSnapshot, NewEmployee, ValidationErrors};
use emphub_infra::{
    EmployeeStore, InMemoryEmployeeStore, PostgresEmployeeStore, StoreError, service_bus,
};
use emphub_messaging::{OutgoingMessage, ServiceBusError, ServiceBusHelper};

use crate::config::ApiConfig;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// The record was written but its snapshot could not be published.
    #[error("employee {employee_id} persisted but publish failed: {source}")]
    Publish {
        employee_id: i64,
        #[source]
        source: ServiceBusError,
    },
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(errors) => Self::Validation(errors),
            DomainError::InvalidId(msg) => Self::Validation(ValidationErrors::single("id", msg)),
        }
    }
}

/// Create/list use cases over a store and a topic.
#[derive(Clone)]
pub struct EmployeeService {
    store: Arc<dyn EmployeeStore>,
    bus: ServiceBusHelper,
    topic: String,
}

impl EmployeeService {
    pub fn new(store: Arc<dyn EmployeeStore>, bus: ServiceBusHelper, topic: impl Into<String>) -> Self {
        Self {
            store,
            bus,
            topic: topic.into(),
        }
    }

    /// Validate, persist, then publish the created record's snapshot.
    ///
    /// Nothing touches the store or the bus unless validation passes. A publish
    /// failure leaves the record persisted.
    #[instrument(skip(self, input), fields(employee_id), err)]
    pub async fn create(&self, input: NewEmployee) -> Result<Employee, ServiceError> {
        let valid = input.validate()?;
        let employee = self.store.insert(valid).await?;
        let employee_id = employee.id_typed().as_i64();
        Span::current().record("employee_id", employee_id);

        let snapshot = EmployeeSnapshot::from_employee(employee.clone());
        let body = snapshot.to_json().map_err(|e| ServiceError::Publish {
            employee_id,
            source: ServiceBusError::Send(format!("failed to encode snapshot: {e}")),
        })?;
        let message = OutgoingMessage::text(body)
            .with_content_type(EmployeeSnapshot::CONTENT_TYPE)
            .with_subject(EmployeeSnapshot::SUBJECT)
            .with_property("schema_version", EmployeeSnapshot::SCHEMA_VERSION);

        let message_id = self
            .bus
            .send_message(&self.topic, message)
            .await
            .map_err(|source| ServiceError::Publish {
                employee_id,
                source,
            })?;

        info!(employee_id, message_id = %message_id, "employee created");
        Ok(employee)
    }

    /// Every record, ordered by id.
    pub async fn list(&self) -> Result<Vec<Employee>, ServiceError> {
        Ok(self.store.list().await?)
    }
}

pub struct AppServices {
    pub employees: EmployeeService,
}

impl AppServices {
    pub fn new(employees: EmployeeService) -> Self {
        Self { employees }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] ServiceBusError),
}

/// Build the service graph described by `config`.
///
/// With `USE_PERSISTENT_STORES=true` the Postgres store is used and its table is
/// created if missing; otherwise records live in memory for the process lifetime.
pub async fn build_services(config: &ApiConfig) -> Result<AppServices, StartupError> {
    let store: Arc<dyn EmployeeStore> = match (
        config.database.use_persistent_stores,
        config.database.database_url.as_deref(),
    ) {
        (true, Some(url)) => {
            let store = PostgresEmployeeStore::connect(url, config.database.max_connections).await?;
            store.ensure_schema().await?;
            info!("using postgres employee store");
            Arc::new(store)
        }
        (true, None) => {
            return Err(StartupError::Store(StoreError::Unavailable(
                "DATABASE_URL is required for persistent stores".to_string(),
            )));
        }
        (false, _) => {
            info!("using in-memory employee store");
            Arc::new(InMemoryEmployeeStore::new())
        }
    };

    let bus = service_bus::connect(&config.bus, &config.subscription_names()).await?;
    let helper = ServiceBusHelper::new(bus);

    Ok(AppServices::new(EmployeeService::new(
        store,
        helper,
        config.bus.topic.clone(),
    )))
}
