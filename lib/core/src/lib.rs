//! Core domain types and utilities for flowrun.
//!
//! This crate provides the identifiers and error handling foundation shared
//! by the workflow engine, the trigger scheduler and the server.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ExecutionId, ParseIdError, TriggerId, WorkflowId};
