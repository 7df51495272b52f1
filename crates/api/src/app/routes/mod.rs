use axum::Router;

pub mod employee;
pub mod system;

/// Router for the `/api` prefix.
pub fn router() -> Router {
    Router::new().nest("/employee", employee::router())
}
