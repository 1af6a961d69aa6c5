//! In-memory storage.
//!
//! Implements every persistence trait over mutex-guarded maps. Used by tests
//! and by embedders that do not need durability.

use crate::definition::Workflow;
use crate::error::StoreError;
use crate::execution::{NewExecution, WorkflowExecution};
use crate::store::{ExecutionStore, TriggerStore, WorkflowStore};
use crate::trigger::{NewTrigger, Trigger, TriggerFilter, TriggerKind};
use async_trait::async_trait;
use flowrun_core::{ExecutionId, TriggerId, WorkflowId};
use rootcause::prelude::Report;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Mutex-backed store for workflows, executions and triggers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    workflows: Mutex<HashMap<WorkflowId, Workflow>>,
    executions: Mutex<HashMap<ExecutionId, WorkflowExecution>>,
    triggers: Mutex<HashMap<TriggerId, Trigger>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a workflow definition.
    pub fn put_workflow(&self, workflow: Workflow) {
        lock(&self.workflows).insert(workflow.id, workflow);
    }

    /// Removes a workflow definition.
    pub fn remove_workflow(&self, id: WorkflowId) -> Option<Workflow> {
        lock(&self.workflows).remove(&id)
    }

    /// Snapshot of every stored trigger.
    #[must_use]
    pub fn all_triggers(&self) -> Vec<Trigger> {
        lock(&self.triggers).values().cloned().collect()
    }

    /// Number of stored executions.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        lock(&self.executions).len()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, Report<StoreError>> {
        Ok(lock(&self.workflows).get(&id).cloned())
    }

    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), Report<StoreError>> {
        self.put_workflow(workflow.clone());
        Ok(())
    }

    async fn delete_workflow(&self, id: WorkflowId) -> Result<bool, Report<StoreError>> {
        Ok(self.remove_workflow(id).is_some())
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn insert_execution(
        &self,
        new: NewExecution,
    ) -> Result<WorkflowExecution, Report<StoreError>> {
        let execution = WorkflowExecution::from_new(ExecutionId::new(), new);
        lock(&self.executions).insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn get_execution(
        &self,
        id: ExecutionId,
    ) -> Result<Option<WorkflowExecution>, Report<StoreError>> {
        Ok(lock(&self.executions).get(&id).cloned())
    }

    async fn update_at_step(
        &self,
        execution: &WorkflowExecution,
        expected_step_index: usize,
    ) -> Result<bool, Report<StoreError>> {
        let mut executions = lock(&self.executions);
        match executions.get_mut(&execution.id) {
            Some(stored) if stored.step_index == expected_step_index => {
                *stored = execution.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_execution(&self, id: ExecutionId) -> Result<(), Report<StoreError>> {
        lock(&self.executions).remove(&id);
        Ok(())
    }
}

#[async_trait]
impl TriggerStore for MemoryStore {
    async fn insert_trigger(&self, new: NewTrigger) -> Result<Trigger, Report<StoreError>> {
        let trigger = Trigger::from_new(TriggerId::new(), new);
        lock(&self.triggers).insert(trigger.id, trigger.clone());
        Ok(trigger)
    }

    async fn triggers_by_kind(&self, kind: TriggerKind) -> Result<Vec<Trigger>, Report<StoreError>> {
        self.find_triggers(&TriggerFilter::kind(kind)).await
    }

    async fn triggers_by_kind_and_key(
        &self,
        kind: TriggerKind,
        key: &str,
    ) -> Result<Vec<Trigger>, Report<StoreError>> {
        self.find_triggers(&TriggerFilter::kind(kind).with_val_string(key))
            .await
    }

    async fn find_triggers(
        &self,
        filter: &TriggerFilter,
    ) -> Result<Vec<Trigger>, Report<StoreError>> {
        Ok(lock(&self.triggers)
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn update_trigger(&self, trigger: &Trigger) -> Result<(), Report<StoreError>> {
        let mut triggers = lock(&self.triggers);
        match triggers.get_mut(&trigger.id) {
            Some(stored) => {
                *stored = trigger.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "trigger",
                id: trigger.id.to_string(),
            }
            .into()),
        }
    }

    async fn delete_trigger(&self, id: TriggerId) -> Result<(), Report<StoreError>> {
        lock(&self.triggers).remove(&id);
        Ok(())
    }

    async fn delete_triggers_for_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<u64, Report<StoreError>> {
        let mut triggers = lock(&self.triggers);
        let before = triggers.len();
        triggers.retain(|_, t| t.execution_id != Some(execution_id));
        Ok((before - triggers.len()) as u64)
    }

    async fn delete_triggers_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<u64, Report<StoreError>> {
        let mut triggers = lock(&self.triggers);
        let before = triggers.len();
        triggers.retain(|_, t| t.workflow_id != Some(workflow_id));
        Ok((before - triggers.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Step;
    use crate::execution::ExecutionState;
    use crate::trigger::TriggerFunction;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn new_execution() -> NewExecution {
        NewExecution {
            workflow_id: WorkflowId::new(),
            trigger_user_id: "U1".to_string(),
            steps: vec![Step::new("stop").with_id("a"), Step::new("stop").with_id("b")],
            state: ExecutionState::default(),
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn update_at_step_rejects_moved_rows() {
        let store = MemoryStore::new();
        let mut exec = store.insert_execution(new_execution()).await.expect("insert");

        exec.advance(&"a".into(), &BTreeMap::new(), None);
        assert!(store.update_at_step(&exec, 0).await.expect("first"));
        // Same pre-advance index again: the row is already at 1.
        assert!(!store.update_at_step(&exec, 0).await.expect("second"));

        let stored = store.get_execution(exec.id).await.expect("get").expect("exists");
        assert_eq!(stored.step_index, 1);
    }

    #[tokio::test]
    async fn update_at_step_on_deleted_row_is_false() {
        let store = MemoryStore::new();
        let exec = store.insert_execution(new_execution()).await.expect("insert");
        store.delete_execution(exec.id).await.expect("delete");
        assert!(!store.update_at_step(&exec, 0).await.expect("update"));
    }

    #[tokio::test]
    async fn trigger_queries_and_deletes() {
        let store = MemoryStore::new();
        let workflow_id = WorkflowId::new();
        let execution_id = ExecutionId::new();
        store
            .insert_trigger(
                NewTrigger::event(TriggerKind::Message, "C1", TriggerFunction::StartWorkflow)
                    .with_workflow(workflow_id),
            )
            .await
            .expect("insert");
        store
            .insert_trigger(
                NewTrigger::time(Utc::now(), TriggerFunction::ResumeStep)
                    .with_execution(execution_id),
            )
            .await
            .expect("insert");

        let by_key = store
            .triggers_by_kind_and_key(TriggerKind::Message, "C1")
            .await
            .expect("query");
        assert_eq!(by_key.len(), 1);
        assert!(
            store
                .triggers_by_kind_and_key(TriggerKind::Message, "C2")
                .await
                .expect("query")
                .is_empty()
        );

        assert_eq!(
            store
                .delete_triggers_for_execution(execution_id)
                .await
                .expect("delete"),
            1
        );
        assert_eq!(
            store
                .delete_triggers_for_workflow(workflow_id)
                .await
                .expect("delete"),
            1
        );
        assert!(store.all_triggers().is_empty());
    }

    #[tokio::test]
    async fn update_missing_trigger_is_not_found() {
        let store = MemoryStore::new();
        let trigger = Trigger::from_new(
            TriggerId::new(),
            NewTrigger::cron("0 9 * * *", TriggerFunction::StartWorkflow),
        );
        let err = store.update_trigger(&trigger).await.expect_err("missing");
        assert!(err.to_string().contains("trigger not found"));
    }
}
