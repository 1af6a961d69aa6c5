//! Postgres implementations of the flowrun storage contracts.
//!
//! This module provides data access for:
//! - Workflow definitions
//! - Workflow executions, advanced with a compare-and-set on `step_index`
//! - Trigger records

pub mod execution;
pub mod trigger;
pub mod workflow;

pub use execution::ExecutionRepository;
pub use trigger::TriggerRepository;
pub use workflow::WorkflowRepository;
