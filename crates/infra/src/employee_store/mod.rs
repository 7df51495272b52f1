//! Employee record store boundary.
//!
//! The store owns the canonical copy of every employee and assigns identity on
//! insert. Records are read-only once created.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEmployeeStore;
pub use postgres::PostgresEmployeeStore;
pub use r#trait::{EmployeeStore, StoreError};
