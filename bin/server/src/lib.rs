//! flowrun server.
//!
//! This crate wires the workflow engine and the trigger scheduler to
//! Postgres storage, a direct-message notifier and an HTTP API.

pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod routes;
