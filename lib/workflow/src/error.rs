//! Error types for the workflow crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: Persistence contract failures
//! - `StepError`: Failures raised by step functions
//! - `TriggerError`: Trigger record and dispatch failures
//! - `NotifyError`: Human notification delivery failures
//! - `EngineError`: Run-level failures (wraps lower errors via context)

use crate::definition::StepId;
use flowrun_core::{ExecutionId, WorkflowId};
use std::fmt;

/// Errors from persistence operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Record not found.
    NotFound { entity: &'static str, id: String },
    /// The storage backend failed.
    Backend { reason: String },
    /// A stored payload could not be decoded into its typed form.
    Decode { entity: &'static str, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Backend { reason } => write!(f, "storage backend failed: {reason}"),
            Self::Decode { entity, reason } => {
                write!(f, "failed to decode stored {entity}: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors raised by step functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// A resolved input could not be interpreted.
    InvalidInput { input: String, reason: String },
    /// The step's action failed (e.g. a downstream call).
    Failed { reason: String },
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { input, reason } => {
                write!(f, "invalid input '{input}': {reason}")
            }
            Self::Failed { reason } => write!(f, "step failed: {reason}"),
        }
    }
}

impl std::error::Error for StepError {}

/// Errors from trigger records and trigger dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// A stored trigger kind is not known to this build.
    UnknownKind { kind: String },
    /// A trigger names a callback that is not registered.
    UnregisteredFunction { name: String },
    /// A trigger lacks a back-reference its callback requires.
    MissingReference { field: &'static str },
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKind { kind } => write!(f, "unknown trigger kind: {kind}"),
            Self::UnregisteredFunction { name } => {
                write!(f, "callback function {name} is not registered")
            }
            Self::MissingReference { field } => {
                write!(f, "trigger is missing required reference: {field}")
            }
        }
    }
}

impl std::error::Error for TriggerError {}

/// Errors from delivering a human-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The platform refused or failed the delivery.
    DeliveryFailed { user_id: String, reason: String },
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeliveryFailed { user_id, reason } => {
                write!(f, "failed to notify {user_id}: {reason}")
            }
        }
    }
}

impl std::error::Error for NotifyError {}

/// Run-level errors surfaced by the execution engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A step references a type id that is not in the registry.
    MissingStepSpec { type_id: String },
    /// A step's stored payload (rich text input, snapshot) failed to parse.
    MalformedStepPayload { step_id: StepId, reason: String },
    /// The step function itself failed.
    StepExecutionFailure { step_id: StepId },
    /// The workflow has no platform credential to run with.
    NoCredential { workflow_id: WorkflowId },
    /// Persistence failed while driving the run (use as context wrapper).
    Storage { execution_id: Option<ExecutionId> },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStepSpec { type_id } => write!(f, "step `{type_id}` not found"),
            Self::MalformedStepPayload { step_id, reason } => {
                write!(f, "malformed payload for step {step_id}: {reason}")
            }
            Self::StepExecutionFailure { step_id } => {
                write!(f, "step {step_id} failed to execute")
            }
            Self::NoCredential { workflow_id } => {
                write!(f, "workflow {workflow_id} has no access credential")
            }
            Self::Storage {
                execution_id: Some(id),
            } => write!(f, "storage failed while driving execution {id}"),
            Self::Storage { execution_id: None } => write!(f, "storage failed while starting run"),
        }
    }
}

impl std::error::Error for EngineError {}
