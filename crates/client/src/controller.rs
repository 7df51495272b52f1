//! Page flow for the employee screen: list, save, clear.

use tracing::{error, info, warn};

use emphub_core::{Employee, FieldError};

use crate::api::{ClientError, EmployeeApiClient};
use crate::form::EmployeeForm;

/// Generic message shown when the API call behind a save fails.
pub const SAVE_FAILED_MESSAGE: &str = "The employee could not be saved. Please try again.";

/// Presentation model for the index page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexModel {
    pub employees: Vec<Employee>,
    /// Form values to re-display; empty after a fresh load.
    pub form: EmployeeForm,
    pub errors: Vec<FieldError>,
    /// Page-level error not tied to a field.
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Render(IndexModel),
    Redirect(String),
}

impl Page {
    fn home() -> Self {
        Page::Redirect("/".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct EmployeeController {
    api: EmployeeApiClient,
}

impl EmployeeController {
    pub fn new(api: EmployeeApiClient) -> Self {
        Self { api }
    }

    /// Current list with an empty form. An API failure shows an empty list.
    pub async fn index(&self) -> IndexModel {
        IndexModel {
            employees: self.employees().await,
            ..IndexModel::default()
        }
    }

    /// Validate locally, then create through the API.
    pub async fn save(&self, form: EmployeeForm) -> Page {
        let input = match form.validate() {
            Ok(input) => input,
            Err(errors) => return self.render_with(form, errors, None).await,
        };

        match self.api.create(&input).await {
            Ok(created) => {
                info!(employee_id = %created.id_typed(), "employee saved");
                Page::home()
            }
            Err(ClientError::Validation(errors)) => self.render_with(form, errors, None).await,
            Err(err) => {
                error!(error = %err, "failed to save employee");
                self.render_with(form, Vec::new(), Some(SAVE_FAILED_MESSAGE.to_string()))
                    .await
            }
        }
    }

    /// Discard the form.
    pub fn clear(&self) -> Page {
        Page::home()
    }

    async fn render_with(
        &self,
        form: EmployeeForm,
        errors: Vec<FieldError>,
        message: Option<String>,
    ) -> Page {
        Page::Render(IndexModel {
            employees: self.employees().await,
            form,
            errors,
            message,
        })
    }

    async fn employees(&self) -> Vec<Employee> {
        match self.api.list().await {
            Ok(employees) => employees,
            Err(err) => {
                warn!(error = %err, "failed to load employees");
                Vec::new()
            }
        }
    }
}
