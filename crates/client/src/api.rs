use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use emphub_core::{Employee, FieldError, NewEmployee};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
}

impl ClientConfig {
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:8080";

    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API rejected the input; one entry per field.
    #[error("rejected by the api: {0:?}")]
    Validation(Vec<FieldError>),

    #[error("api returned {status}: {code}")]
    Api { status: u16, code: String, message: String },
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: BTreeMap<String, String>,
}

/// Typed HTTP client for the employee API.
#[derive(Debug, Clone)]
pub struct EmployeeApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl EmployeeApiClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
        }
    }

    /// `GET /api/employee/echo`
    pub async fn echo(&self) -> Result<String, ClientError> {
        let res = self
            .http
            .get(format!("{}/api/employee/echo", self.base_url))
            .send()
            .await?;
        Ok(check(res).await?.text().await?)
    }

    /// `GET /api/employee`
    #[instrument(skip(self), err)]
    pub async fn list(&self) -> Result<Vec<Employee>, ClientError> {
        let res = self
            .http
            .get(format!("{}/api/employee", self.base_url))
            .send()
            .await?;
        Ok(check(res).await?.json().await?)
    }

    /// `POST /api/employee`
    #[instrument(skip(self, input), err)]
    pub async fn create(&self, input: &NewEmployee) -> Result<Employee, ClientError> {
        let res = self
            .http
            .post(format!("{}/api/employee", self.base_url))
            .json(input)
            .send()
            .await?;
        Ok(check(res).await?.json().await?)
    }
}

async fn check(res: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body: ErrorBody = res.json().await.unwrap_or_else(|_| ErrorBody {
        error: "unknown".to_string(),
        message: String::new(),
        details: BTreeMap::new(),
    });

    if body.error == "validation_error" && !body.details.is_empty() {
        return Err(ClientError::Validation(
            body.details
                .into_iter()
                .map(|(field, message)| FieldError { field, message })
                .collect(),
        ));
    }

    Err(ClientError::Api {
        status: status.as_u16(),
        code: body.error,
        message: body.message,
    })
}
