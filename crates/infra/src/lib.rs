//! Infrastructure layer: record store, broker backends, config.

pub mod config;
pub mod employee_store;
pub mod service_bus;

pub use config::{BusConfig, DatabaseConfig};
pub use employee_store::{EmployeeStore, InMemoryEmployeeStore, PostgresEmployeeStore, StoreError};
