//! Workflow engine for flowrun.
//!
//! This crate provides the step execution engine, including:
//!
//! - **Definitions**: Workflows as ordered lists of typed steps with stable ids
//! - **Tokens**: Placeholder substitution in flat text and rich text documents
//! - **Step Registry**: Declared input/output shapes and step functions
//! - **Branching**: Per-step guard conditions
//! - **Engine**: Start, proceed and resume of runs with compare-and-set advancement
//! - **Triggers**: Persisted wake-up records and their callback names
//! - **Storage**: Persistence contracts and an in-memory implementation

pub mod branch;
pub mod definition;
pub mod engine;
pub mod error;
pub mod execution;
pub mod memory;
pub mod notify;
pub mod rich_text;
pub mod step;
pub mod steps;
pub mod store;
pub mod token;
pub mod trigger;

pub use definition::{AccessToken, BranchOp, BranchingSpec, OnFalse, Step, StepId, Workflow};
pub use engine::{Engine, RunOutcome, StartedRun};
pub use error::{EngineError, NotifyError, StepError, StoreError, TriggerError};
pub use execution::{ExecutionState, NewExecution, WorkflowExecution};
pub use memory::MemoryStore;
pub use notify::{LogNotifier, Notifier};
pub use step::{
    DataType, IoSpec, StepContext, StepFunction, StepOutcome, StepRegistry, StepSpec,
};
pub use store::{ExecutionStore, TriggerStore, WorkflowStore};
pub use trigger::{
    EventPayload, NewTrigger, Trigger, TriggerFilter, TriggerFunction, TriggerKind,
};
