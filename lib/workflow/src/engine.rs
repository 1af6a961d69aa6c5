//! The execution engine.
//!
//! A run moves through its snapshot one step at a time:
//!
//! 1. Build the replacement set from the trigger user, stored outputs and
//!    additional context
//! 2. Resolve the step's inputs (rich text inputs get structural
//!    substitution, everything else flat substitution)
//! 3. Evaluate the branching guard
//! 4. Invoke the step function
//! 5. Either suspend (the step returned pending) or advance and continue
//!
//! Advancing is a compare-and-set on `step_index`, so a duplicate or racing
//! resume of the same step is absorbed as stale instead of advancing twice.

use crate::branch::{self, BranchDecision};
use crate::definition::{Step, StepId, Workflow};
use crate::error::{EngineError, StoreError};
use crate::execution::{ExecutionState, NewExecution, WorkflowExecution};
use crate::notify::{Notifier, failure_message};
use crate::rich_text::substitute_rich_text_json;
use crate::step::{DataType, StepContext, StepOutcome, StepRegistry, StepSpec};
use crate::store::{ExecutionStore, TriggerStore, WorkflowStore};
use crate::token::{Replacements, substitute_text};
use flowrun_core::{ExecutionId, WorkflowId};
use rootcause::prelude::Report;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// How a call into the engine left the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step has run.
    Completed,
    /// A step returned pending; the run waits for a resume of that step.
    Suspended { step_id: StepId },
    /// A branching guard was false with the halt policy.
    Halted { step_id: StepId },
    /// The step failed. The row stays parked at that step.
    Aborted { step_id: StepId },
    /// The owning workflow is gone; the execution row was deleted.
    Abandoned,
    /// Nothing to do: unknown execution, duplicate resume, or a lost race.
    Stale,
}

/// A newly started run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedRun {
    /// The new execution row.
    pub execution_id: ExecutionId,
    /// Where the first drive left it.
    pub outcome: RunOutcome,
}

enum StepResult {
    Outputs(BTreeMap<String, String>),
    Pending,
    Halted,
    Skipped,
}

/// Drives workflow executions.
#[derive(Clone)]
pub struct Engine {
    workflows: Arc<dyn WorkflowStore>,
    executions: Arc<dyn ExecutionStore>,
    triggers: Arc<dyn TriggerStore>,
    registry: Arc<StepRegistry>,
    notifier: Arc<dyn Notifier>,
}

fn storage(execution_id: Option<ExecutionId>) -> EngineError {
    EngineError::Storage { execution_id }
}

impl Engine {
    /// Creates an engine over the given stores, registry and notifier.
    #[must_use]
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        executions: Arc<dyn ExecutionStore>,
        triggers: Arc<dyn TriggerStore>,
        registry: Arc<StepRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            workflows,
            executions,
            triggers,
            registry,
            notifier,
        }
    }

    /// Returns the step registry.
    #[must_use]
    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Loads a workflow definition.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn load_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Option<Workflow>, Report<EngineError>> {
        self.workflows
            .get_workflow(workflow_id)
            .await
            .map_err(|e| e.context(storage(None)))
    }

    /// Starts a run of `workflow` on behalf of `user` and drives it until it
    /// completes, suspends, halts or aborts.
    ///
    /// Returns `None` without creating a run if the workflow has no access
    /// credential.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    #[instrument(skip(self, workflow, additional_ctx), fields(workflow_id = %workflow.id))]
    pub async fn start_workflow(
        &self,
        workflow: &Workflow,
        user: &str,
        additional_ctx: BTreeMap<String, String>,
        correlation_id: Option<String>,
    ) -> Result<Option<StartedRun>, Report<EngineError>> {
        if workflow.access_token.is_none() {
            warn!("workflow has no access credential, not starting");
            return Ok(None);
        }

        let execution = self
            .executions
            .insert_execution(NewExecution {
                workflow_id: workflow.id,
                trigger_user_id: user.to_string(),
                steps: workflow.steps.clone(),
                state: ExecutionState::new(additional_ctx),
                correlation_id,
            })
            .await
            .map_err(|e| e.context(storage(None)))?;

        let execution_id = execution.id;
        info!(%execution_id, steps = execution.steps.len(), "workflow run started");
        let outcome = self.drive(execution).await?;
        Ok(Some(StartedRun {
            execution_id,
            outcome,
        }))
    }

    /// Loads a workflow and starts a run of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow does not exist or storage fails.
    pub async fn start_workflow_by_id(
        &self,
        workflow_id: WorkflowId,
        user: &str,
        additional_ctx: BTreeMap<String, String>,
        correlation_id: Option<String>,
    ) -> Result<Option<StartedRun>, Report<EngineError>> {
        let Some(workflow) = self.load_workflow(workflow_id).await? else {
            let missing: Report<StoreError> = StoreError::NotFound {
                entity: "workflow",
                id: workflow_id.to_string(),
            }
            .into();
            return Err(missing.context(storage(None)));
        };
        self.start_workflow(&workflow, user, additional_ctx, correlation_id)
            .await
    }

    /// Drives an existing run from its current step.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails. Step failures are not errors; they
    /// abort the run and are reported as [`RunOutcome::Aborted`].
    #[instrument(skip_all, fields(execution_id = %execution.id))]
    pub async fn proceed_workflow(
        &self,
        execution: WorkflowExecution,
    ) -> Result<RunOutcome, Report<EngineError>> {
        self.drive(execution).await
    }

    /// Records an external completion of `step_id` and continues the run.
    ///
    /// The call is a no-op returning [`RunOutcome::Stale`] if the execution
    /// is gone or is not currently at `step_id`. A `correlation_id` replaces
    /// the stored one; `None` keeps it.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    #[instrument(skip_all, fields(%execution_id, %step_id))]
    pub async fn advance_workflow(
        &self,
        execution_id: ExecutionId,
        step_id: &StepId,
        outputs: BTreeMap<String, String>,
        correlation_id: Option<String>,
    ) -> Result<RunOutcome, Report<EngineError>> {
        let execution = self
            .executions
            .get_execution(execution_id)
            .await
            .map_err(|e| e.context(storage(Some(execution_id))))?;
        let Some(execution) = execution else {
            debug!("execution not found, ignoring resume");
            return Ok(RunOutcome::Stale);
        };

        if execution.position_of(step_id) != Some(execution.step_index) {
            warn!(
                step_index = execution.step_index,
                "resume does not match current step, ignoring"
            );
            return Ok(RunOutcome::Stale);
        }

        match self
            .commit(execution, step_id, &outputs, correlation_id.map(Some))
            .await?
        {
            Some(next) => self.drive(next).await,
            None => Ok(RunOutcome::Stale),
        }
    }

    async fn drive(
        &self,
        mut execution: WorkflowExecution,
    ) -> Result<RunOutcome, Report<EngineError>> {
        loop {
            let execution_id = execution.id;
            let workflow = self
                .workflows
                .get_workflow(execution.workflow_id)
                .await
                .map_err(|e| e.context(storage(Some(execution_id))))?;
            let Some(workflow) = workflow else {
                info!(%execution_id, "workflow no longer exists, deleting execution");
                self.triggers
                    .delete_triggers_for_execution(execution_id)
                    .await
                    .map_err(|e| e.context(storage(Some(execution_id))))?;
                self.executions
                    .delete_execution(execution_id)
                    .await
                    .map_err(|e| e.context(storage(Some(execution_id))))?;
                return Ok(RunOutcome::Abandoned);
            };

            let Some(step) = execution.current_step().cloned() else {
                info!(%execution_id, "workflow run finished");
                return Ok(RunOutcome::Completed);
            };

            debug!(%execution_id, step_id = %step.id, type_id = %step.type_id, "running step");
            let outputs = match self.run_step(&workflow, &execution, &step).await {
                Ok(StepResult::Outputs(outputs)) => outputs,
                Ok(StepResult::Skipped) => {
                    debug!(%execution_id, step_id = %step.id, "branch condition false, skipping step");
                    BTreeMap::new()
                }
                Ok(StepResult::Halted) => {
                    info!(%execution_id, step_id = %step.id, "branch condition false, run halted");
                    return Ok(RunOutcome::Halted { step_id: step.id });
                }
                Ok(StepResult::Pending) => {
                    debug!(%execution_id, step_id = %step.id, "step pending, run suspended");
                    return Ok(RunOutcome::Suspended { step_id: step.id });
                }
                Err(report) => {
                    self.abort(&workflow, &execution, &step, &report).await;
                    return Ok(RunOutcome::Aborted { step_id: step.id });
                }
            };

            match self.commit(execution, &step.id, &outputs, None).await? {
                Some(next) => execution = next,
                None => return Ok(RunOutcome::Stale),
            }
        }
    }

    async fn run_step(
        &self,
        workflow: &Workflow,
        execution: &WorkflowExecution,
        step: &Step,
    ) -> Result<StepResult, Report<EngineError>> {
        let replacements = Replacements::for_run(&execution.trigger_user_id, &execution.state);
        let definition =
            self.registry
                .get(&step.type_id)
                .ok_or_else(|| EngineError::MissingStepSpec {
                    type_id: step.type_id.clone(),
                })?;
        let inputs = resolve_inputs(step, &definition.spec, &replacements)?;

        match branch::evaluate(step.branching.as_ref(), &replacements) {
            BranchDecision::Run => {}
            BranchDecision::Halt => return Ok(StepResult::Halted),
            BranchDecision::Skip => return Ok(StepResult::Skipped),
        }

        let credential =
            workflow
                .access_token
                .clone()
                .ok_or_else(|| EngineError::NoCredential {
                    workflow_id: workflow.id,
                })?;
        let ctx = StepContext {
            execution_id: execution.id,
            step_id: step.id.clone(),
            trigger_user_id: execution.trigger_user_id.clone(),
            correlation_id: execution.correlation_id.clone(),
            credential,
            workflow: workflow.clone(),
        };

        let outcome = definition
            .function
            .run(&ctx, &inputs)
            .await
            .map_err(|e| {
                e.context(EngineError::StepExecutionFailure {
                    step_id: step.id.clone(),
                })
            })?;
        Ok(match outcome {
            StepOutcome::Outputs(outputs) => StepResult::Outputs(outputs),
            StepOutcome::Pending => StepResult::Pending,
        })
    }

    /// Advances past `step_id` and persists with a compare-and-set.
    ///
    /// Returns `None` when another writer moved the row first.
    async fn commit(
        &self,
        mut execution: WorkflowExecution,
        step_id: &StepId,
        outputs: &BTreeMap<String, String>,
        correlation_id: Option<Option<String>>,
    ) -> Result<Option<WorkflowExecution>, Report<EngineError>> {
        let expected = execution.step_index;
        execution.advance(step_id, outputs, correlation_id);
        let written = self
            .executions
            .update_at_step(&execution, expected)
            .await
            .map_err(|e| e.context(storage(Some(execution.id))))?;
        if written {
            Ok(Some(execution))
        } else {
            warn!(execution_id = %execution.id, %step_id, "execution advanced concurrently, ignoring");
            Ok(None)
        }
    }

    async fn abort(
        &self,
        workflow: &Workflow,
        execution: &WorkflowExecution,
        step: &Step,
        report: &Report<EngineError>,
    ) {
        error!(
            execution_id = %execution.id,
            step_id = %step.id,
            error = %report,
            "workflow run aborted"
        );
        let text = failure_message(&workflow.name, &report.to_string());
        if let Err(e) = self
            .notifier
            .notify_user(&execution.trigger_user_id, &text)
            .await
        {
            warn!(execution_id = %execution.id, error = %e, "failed to deliver failure notification");
        }
    }
}

fn resolve_inputs(
    step: &Step,
    spec: &StepSpec,
    replacements: &Replacements,
) -> Result<BTreeMap<String, String>, Report<EngineError>> {
    let mut inputs = BTreeMap::new();
    for input in &spec.inputs {
        let raw = step.inputs.get(input.key).map(String::as_str).unwrap_or_default();
        let value = if input.data_type == DataType::RichText {
            substitute_rich_text_json(raw, replacements).map_err(|e| {
                EngineError::MalformedStepPayload {
                    step_id: step.id.clone(),
                    reason: format!("input `{}`: {e}", input.key),
                }
            })?
        } else {
            substitute_text(raw, replacements)
        };
        inputs.insert(input.key.to_string(), value);
    }
    Ok(inputs)
}
