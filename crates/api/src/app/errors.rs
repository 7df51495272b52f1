use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use emphub_core::ValidationErrors;

use crate::app::services::ServiceError;

/// Map a service failure to its HTTP response.
///
/// Store and bus failures are logged in full here and answered with an opaque
/// code; their text never reaches the caller.
pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Validation(errors) => validation_error(&errors),
        ServiceError::Persistence(e) => {
            tracing::error!(error = %e, "failed to persist employee");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "persistence_error",
                "the employee record could not be saved",
            )
        }
        ServiceError::Publish {
            employee_id,
            source,
        } => {
            tracing::error!(employee_id, error = %source, "failed to publish employee snapshot");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "publish_error",
                "the employee record was saved but could not be published",
            )
        }
    }
}

pub fn validation_error(errors: &ValidationErrors) -> axum::response::Response {
    let mut details: BTreeMap<&str, String> = BTreeMap::new();
    for e in errors.iter() {
        details
            .entry(e.field.as_str())
            .and_modify(|existing| {
                existing.push_str("; ");
                existing.push_str(&e.message);
            })
            .or_insert_with(|| e.message.clone());
    }

    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "error": "validation_error",
            "message": "one or more fields are invalid",
            "details": details,
        })),
    )
        .into_response()
}

pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    tracing::debug!(error = %rejection.body_text(), "rejected request body");
    json_error(
        StatusCode::BAD_REQUEST,
        "invalid_body",
        "request body must be a JSON employee object",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
