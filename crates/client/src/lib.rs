//! Web client for the employee API: a typed HTTP client and the page flow
//! (index, save, clear) that produces presentation models.

pub mod api;
pub mod controller;
pub mod form;

pub use api::{ClientConfig, ClientError, EmployeeApiClient};
pub use controller::{EmployeeController, IndexModel, Page};
pub use form::EmployeeForm;
