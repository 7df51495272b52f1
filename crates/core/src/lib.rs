//! `emphub-core` — employee domain building blocks.
//!
//! This crate contains **pure domain** types (no infrastructure concerns): the
//! `Employee` entity, its creation input, and the value objects that guard the
//! required/format constraints.

pub mod email;
pub mod employee;
pub mod entity;
pub mod error;
pub mod id;
pub mod phone;
pub mod salary;
pub mod snapshot;
pub mod value_object;

pub use email::EmailAddress;
pub use employee::{Employee, NewEmployee, ValidEmployee};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, FieldError, ValidationErrors};
pub use id::EmployeeId;
pub use phone::PhoneNumber;
pub use salary::Salary;
pub use snapshot::EmployeeSnapshot;
pub use value_object::ValueObject;
