//! Point-in-time employee snapshot carried as a bus message body.

use serde::{Deserialize, Serialize};

use crate::employee::Employee;

/// Serialized Employee published after a successful create.
///
/// The JSON body is exactly the `Employee` JSON shape; transport metadata
/// (subject, content type, schema marker) travels alongside as message
/// properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeSnapshot(Employee);

impl EmployeeSnapshot {
    /// Value of the `schema_version` application property.
    pub const SCHEMA_VERSION: &'static str = "1";
    pub const SUBJECT: &'static str = "employee.created";
    pub const CONTENT_TYPE: &'static str = "application/json";

    pub fn from_employee(employee: Employee) -> Self {
        Self(employee)
    }

    pub fn employee(&self) -> &Employee {
        &self.0
    }

    pub fn into_employee(self) -> Employee {
        self.0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }
}

impl From<Employee> for EmployeeSnapshot {
    fn from(employee: Employee) -> Self {
        Self::from_employee(employee)
    }
}
