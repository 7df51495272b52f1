use std::sync::Arc;

use axum::{
    extract::{Extension, rejection::JsonRejection},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use emphub_core::NewEmployee;

use crate::app::errors;
use crate::app::services::AppServices;

pub const ECHO_TEXT: &str = "Echo from server.";

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_employees).post(create_employee))
        .route("/echo", get(echo))
}

pub async fn list_employees(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.employees.list().await {
        Ok(employees) => Json(employees).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_employee(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<NewEmployee>, JsonRejection>,
) -> axum::response::Response {
    let Json(input) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services.employees.create(input).await {
        Ok(employee) => Json(employee).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn echo() -> &'static str {
    ECHO_TEXT
}
