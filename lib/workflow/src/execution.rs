//! Workflow execution records.
//!
//! One `WorkflowExecution` row exists per run. It carries a snapshot of the
//! workflow's steps taken at start time, so edits to the workflow never
//! affect a run in flight, and a `step_index` that only ever increases.

use crate::definition::{Step, StepId};
use chrono::{DateTime, Utc};
use flowrun_core::{ExecutionId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mutable state carried by a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    /// Step outputs keyed `"<stepId>.<outputKey>"`. Append-only.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// Extra caller-supplied context, available as tokens for the whole run.
    #[serde(default)]
    pub additional_ctx: BTreeMap<String, String>,
}

impl ExecutionState {
    /// Creates state for a new run.
    #[must_use]
    pub fn new(additional_ctx: BTreeMap<String, String>) -> Self {
        Self {
            outputs: BTreeMap::new(),
            additional_ctx,
        }
    }

    /// Records a step's outputs under the step's namespace.
    pub fn record_outputs(&mut self, step_id: &StepId, outputs: &BTreeMap<String, String>) {
        for (key, value) in outputs {
            self.outputs.insert(format!("{step_id}.{key}"), value.clone());
        }
    }

    /// Returns a stored output.
    #[must_use]
    pub fn output(&self, step_id: &StepId, key: &str) -> Option<&str> {
        self.outputs
            .get(&format!("{step_id}.{key}"))
            .map(String::as_str)
    }
}

/// Fields supplied when inserting a new execution.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExecution {
    /// Owning workflow.
    pub workflow_id: WorkflowId,
    /// User the run acts on behalf of.
    pub trigger_user_id: String,
    /// Snapshot of the workflow's steps.
    pub steps: Vec<Step>,
    /// Initial state.
    pub state: ExecutionState,
    /// Correlation id of a pending external interaction.
    pub correlation_id: Option<String>,
}

/// One run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Unique identifier.
    pub id: ExecutionId,
    /// Owning workflow.
    pub workflow_id: WorkflowId,
    /// User the run acts on behalf of.
    pub trigger_user_id: String,
    /// Snapshot of the workflow's steps at start time.
    pub steps: Vec<Step>,
    /// Index of the next step to run.
    pub step_index: usize,
    /// Outputs and context.
    pub state: ExecutionState,
    /// Correlation id of a pending external interaction.
    pub correlation_id: Option<String>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecution {
    /// Materializes a new row at step zero.
    #[must_use]
    pub fn from_new(id: ExecutionId, new: NewExecution) -> Self {
        let now = Utc::now();
        Self {
            id,
            workflow_id: new.workflow_id,
            trigger_user_id: new.trigger_user_id,
            steps: new.steps,
            step_index: 0,
            state: new.state,
            correlation_id: new.correlation_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the step that runs next, if any.
    #[must_use]
    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.step_index)
    }

    /// Returns the snapshot position of a step.
    #[must_use]
    pub fn position_of(&self, step_id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == step_id)
    }

    /// Records a step's outputs and moves past it.
    pub fn advance(
        &mut self,
        step_id: &StepId,
        outputs: &BTreeMap<String, String>,
        correlation_id: Option<Option<String>>,
    ) {
        self.state.record_outputs(step_id, outputs);
        self.step_index += 1;
        if let Some(correlation_id) = correlation_id {
            self.correlation_id = correlation_id;
        }
        self.updated_at = Utc::now();
    }
}
