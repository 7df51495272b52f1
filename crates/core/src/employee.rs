use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::email::EmailAddress;
use crate::entity::Entity;
use crate::error::{DomainError, DomainResult, ValidationErrors};
use crate::id::EmployeeId;
use crate::phone::PhoneNumber;
use crate::salary::Salary;

/// Creation input for an employee, as submitted by a client.
///
/// Every field is optional on the wire so that a missing field surfaces as a
/// validation error (with the field name) rather than a parse failure. An `id`
/// sent by the client is ignored; the store assigns identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewEmployee {
    pub name: String,
    pub email: String,
    pub department: String,
    pub hire_date: Option<NaiveDate>,
    #[serde(deserialize_with = "crate::salary::deserialize_exact")]
    pub salary: Decimal,
    pub phone_number: String,
}

impl NewEmployee {
    /// Check every required/format constraint, collecting all violations.
    pub fn validate(&self) -> DomainResult<ValidEmployee> {
        let mut errors = ValidationErrors::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.push("name", "is required");
        }

        let email = errors.collect(EmailAddress::parse(&self.email));
        let phone_number = errors.collect(PhoneNumber::parse(&self.phone_number));
        let salary = errors.collect(Salary::new(self.salary));

        if self.hire_date.is_none() {
            errors.push("hireDate", "is required");
        }

        match (email, phone_number, salary, self.hire_date) {
            (Some(email), Some(phone_number), Some(salary), Some(hire_date)) if errors.is_empty() => {
                Ok(ValidEmployee {
                    name: name.to_string(),
                    email,
                    department: self.department.trim().to_string(),
                    hire_date,
                    salary,
                    phone_number,
                })
            }
            _ => Err(DomainError::Validation(errors)),
        }
    }
}

/// An employee that passed validation but has no identity yet.
///
/// Only `NewEmployee::validate` produces this type, so holding one is proof that
/// the record may be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidEmployee {
    name: String,
    email: EmailAddress,
    department: String,
    hire_date: NaiveDate,
    salary: Salary,
    phone_number: PhoneNumber,
}

impl ValidEmployee {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &EmailAddress {
        &self.email
    }

    pub fn department(&self) -> &str {
        &self.department
    }

    pub fn hire_date(&self) -> NaiveDate {
        self.hire_date
    }

    pub fn salary(&self) -> Salary {
        self.salary
    }

    pub fn phone_number(&self) -> &PhoneNumber {
        &self.phone_number
    }

    /// Attach the store-assigned identity.
    pub fn with_id(self, id: EmployeeId) -> Employee {
        Employee {
            id,
            name: self.name,
            email: self.email,
            department: self.department,
            hire_date: self.hire_date,
            salary: self.salary,
            phone_number: self.phone_number,
        }
    }
}

/// Entity: Employee record (read-only once created).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    id: EmployeeId,
    name: String,
    email: EmailAddress,
    #[serde(default)]
    department: String,
    hire_date: NaiveDate,
    #[serde(default)]
    salary: Salary,
    phone_number: PhoneNumber,
}

impl Employee {
    pub fn id_typed(&self) -> EmployeeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &EmailAddress {
        &self.email
    }

    pub fn department(&self) -> &str {
        &self.department
    }

    pub fn hire_date(&self) -> NaiveDate {
        self.hire_date
    }

    pub fn salary(&self) -> Salary {
        self.salary
    }

    pub fn phone_number(&self) -> &PhoneNumber {
        &self.phone_number
    }
}

impl Entity for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn valid_input() -> NewEmployee {
        NewEmployee {
            name: "A".to_string(),
            email: "a@b.com".to_string(),
            department: "IT".to_string(),
            hire_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            salary: Decimal::from_str("50000.00").unwrap(),
            phone_number: "+15551234567".to_string(),
        }
    }

    fn field_errors(input: &NewEmployee) -> ValidationErrors {
        match input.validate() {
            Err(DomainError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_input_produces_valid_employee() {
        let valid = valid_input().validate().unwrap();
        assert_eq!(valid.name(), "A");
        assert_eq!(valid.email().as_str(), "a@b.com");
        assert_eq!(valid.salary().to_string(), "50000.00");
    }

    #[test]
    fn missing_required_fields_are_all_reported() {
        let errors = field_errors(&NewEmployee::default());
        assert!(errors.has_field("name"));
        assert!(errors.has_field("email"));
        assert!(errors.has_field("phoneNumber"));
        assert!(errors.has_field("hireDate"));
    }

    #[test]
    fn malformed_email_and_phone_are_rejected() {
        let mut input = valid_input();
        input.email = "not-an-email".to_string();
        input.phone_number = "call me".to_string();

        let errors = field_errors(&input);
        assert_eq!(errors.len(), 2);
        assert!(errors.has_field("email"));
        assert!(errors.has_field("phoneNumber"));
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut input = valid_input();
        input.name = "   ".to_string();
        assert!(field_errors(&input).has_field("name"));
    }

    #[test]
    fn sixteen_digit_numeric_salary_is_kept_exactly() {
        let input: NewEmployee = serde_json::from_str(
            r#"{"name":"A","email":"a@b.com","phoneNumber":"+15551234567","hireDate":"2024-01-01","salary":1234567890123456.78}"#,
        )
        .unwrap();
        let employee = input.validate().unwrap().with_id(EmployeeId::new(1));
        assert_eq!(employee.salary().to_string(), "1234567890123456.78");

        let json = serde_json::to_value(&employee).unwrap();
        assert_eq!(json["salary"], "1234567890123456.78");
    }

    #[test]
    fn salary_at_the_bound_is_accepted_from_a_number() {
        let input: NewEmployee = serde_json::from_str(
            r#"{"name":"A","email":"a@b.com","phoneNumber":"+15551234567","hireDate":"2024-01-01","salary":9999999999999999.99}"#,
        )
        .unwrap();
        assert_eq!(input.validate().unwrap().salary().to_string(), "9999999999999999.99");
    }

    #[test]
    fn department_is_free_text() {
        let mut input = valid_input();
        input.department = String::new();
        assert!(input.validate().is_ok());
    }

    #[test]
    fn with_id_keeps_every_field() {
        let employee = valid_input().validate().unwrap().with_id(EmployeeId::new(9));
        assert_eq!(employee.id_typed(), EmployeeId::new(9));
        assert_eq!(employee.name(), "A");
        assert_eq!(employee.department(), "IT");
        assert_eq!(employee.hire_date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(employee.phone_number().as_str(), "+15551234567");
    }

    #[test]
    fn new_employee_parses_client_json() {
        let input: NewEmployee = serde_json::from_str(
            r#"{"name":"A","email":"a@b.com","phoneNumber":"+15551234567","department":"IT","hireDate":"2024-01-01","salary":50000.00}"#,
        )
        .unwrap();
        assert_eq!(input, valid_input());
    }

    #[test]
    fn employee_json_uses_camel_case() {
        let employee = valid_input().validate().unwrap().with_id(EmployeeId::new(1));
        let json = serde_json::to_value(&employee).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["phoneNumber"], "+15551234567");
        assert_eq!(json["hireDate"], "2024-01-01");
        assert_eq!(json["salary"], "50000.00");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: any well-formed input validates, and nothing is lost on the way
            /// to an identified record.
            #[test]
            fn valid_inputs_survive_validation(
                name in "[A-Za-z][A-Za-z ]{0,40}[A-Za-z]",
                local in "[a-z][a-z0-9.]{0,15}[a-z0-9]",
                domain in "[a-z]{1,12}",
                tld in "[a-z]{2,6}",
                department in "[A-Za-z ]{0,20}",
                digits in "[0-9]{7,15}",
                cents in 0_i64..=99_999_999_99,
                day in 0_i64..10_000,
            ) {
                let hire_date = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap() + chrono::Days::new(day as u64);
                let input = NewEmployee {
                    name: name.clone(),
                    email: format!("{local}@{domain}.{tld}"),
                    department: department.clone(),
                    hire_date: Some(hire_date),
                    salary: Decimal::new(cents, 2),
                    phone_number: format!("+{digits}"),
                };

                let employee = input.validate().unwrap().with_id(EmployeeId::new(1));
                prop_assert_eq!(employee.name(), name.trim());
                prop_assert_eq!(employee.department(), department.trim());
                prop_assert_eq!(employee.hire_date(), hire_date);
                prop_assert_eq!(employee.salary().amount(), Decimal::new(cents, 2));
            }
        }
    }
}
