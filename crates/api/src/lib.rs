//! HTTP API: employee CRUD endpoints over the record store and the message bus.

pub mod app;
pub mod config;
