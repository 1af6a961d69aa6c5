//! Persistence contracts.
//!
//! The engine and scheduler only talk to storage through these traits. The
//! server implements them over Postgres; [`crate::memory::MemoryStore`]
//! implements them in memory.

use crate::definition::Workflow;
use crate::error::StoreError;
use crate::execution::{NewExecution, WorkflowExecution};
use crate::trigger::{NewTrigger, Trigger, TriggerFilter, TriggerKind};
use async_trait::async_trait;
use flowrun_core::{ExecutionId, TriggerId, WorkflowId};
use rootcause::prelude::Report;

/// Workflow definition storage.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Loads a workflow by id.
    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, Report<StoreError>>;

    /// Inserts or replaces a workflow. Existing runs keep their snapshots.
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), Report<StoreError>>;

    /// Deletes a workflow; returns false if it did not exist.
    async fn delete_workflow(&self, id: WorkflowId) -> Result<bool, Report<StoreError>>;
}

/// Execution row storage.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Inserts a new run at step zero and returns the stored row.
    async fn insert_execution(
        &self,
        new: NewExecution,
    ) -> Result<WorkflowExecution, Report<StoreError>>;

    /// Loads a run by id.
    async fn get_execution(
        &self,
        id: ExecutionId,
    ) -> Result<Option<WorkflowExecution>, Report<StoreError>>;

    /// Writes `execution` only if the stored row is still at
    /// `expected_step_index`.
    ///
    /// Returns false, without writing, when the row moved on or is gone.
    async fn update_at_step(
        &self,
        execution: &WorkflowExecution,
        expected_step_index: usize,
    ) -> Result<bool, Report<StoreError>>;

    /// Deletes a run. Deleting a missing row is not an error.
    async fn delete_execution(&self, id: ExecutionId) -> Result<(), Report<StoreError>>;
}

/// Trigger record storage.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Inserts a trigger and returns the stored record.
    async fn insert_trigger(&self, new: NewTrigger) -> Result<Trigger, Report<StoreError>>;

    /// All triggers of a kind.
    async fn triggers_by_kind(&self, kind: TriggerKind) -> Result<Vec<Trigger>, Report<StoreError>>;

    /// Triggers of a kind whose string key equals `key`.
    async fn triggers_by_kind_and_key(
        &self,
        kind: TriggerKind,
        key: &str,
    ) -> Result<Vec<Trigger>, Report<StoreError>>;

    /// Triggers satisfying `filter`.
    async fn find_triggers(&self, filter: &TriggerFilter)
    -> Result<Vec<Trigger>, Report<StoreError>>;

    /// Overwrites a stored trigger.
    async fn update_trigger(&self, trigger: &Trigger) -> Result<(), Report<StoreError>>;

    /// Deletes a trigger. Deleting a missing record is not an error.
    async fn delete_trigger(&self, id: TriggerId) -> Result<(), Report<StoreError>>;

    /// Deletes every trigger referencing an execution; returns the count.
    async fn delete_triggers_for_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<u64, Report<StoreError>>;

    /// Deletes every trigger referencing a workflow; returns the count.
    async fn delete_triggers_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<u64, Report<StoreError>>;
}
