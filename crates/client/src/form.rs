use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use emphub_core::{DomainError, FieldError, NewEmployee};

/// Create form as typed by a user: every field is raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmployeeForm {
    pub name: String,
    pub email: String,
    pub department: String,
    /// `YYYY-MM-DD`
    pub hire_date: String,
    pub salary: String,
    pub phone_number: String,
}

impl EmployeeForm {
    /// Parse and validate with the same rules the API applies.
    ///
    /// Every violation is reported, one entry per field.
    pub fn validate(&self) -> Result<NewEmployee, Vec<FieldError>> {
        let mut errors = Vec::new();

        let hire_date = match self.hire_date.trim() {
            "" => None,
            raw => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    errors.push(field_error("hireDate", "must be a date (YYYY-MM-DD)"));
                    None
                }
            },
        };

        let salary = match self.salary.trim() {
            "" => Decimal::ZERO,
            raw => Decimal::from_str(raw).unwrap_or_else(|_| {
                errors.push(field_error("salary", "must be a number"));
                Decimal::ZERO
            }),
        };

        let input = NewEmployee {
            name: self.name.clone(),
            email: self.email.clone(),
            department: self.department.clone(),
            hire_date,
            salary,
            phone_number: self.phone_number.clone(),
        };

        match input.validate() {
            Ok(_) => {}
            Err(DomainError::Validation(found)) => {
                for e in found.iter() {
                    if !errors.iter().any(|existing: &FieldError| existing.field == e.field) {
                        errors.push(e.clone());
                    }
                }
            }
            Err(DomainError::InvalidId(msg)) => errors.push(field_error("id", &msg)),
        }

        if errors.is_empty() { Ok(input) } else { Err(errors) }
    }
}

fn field_error(field: &str, message: &str) -> FieldError {
    FieldError {
        field: field.to_string(),
        message: message.to_string(),
    }
}
