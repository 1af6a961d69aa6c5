//! Trigger callback dispatch.
//!
//! Trigger records name their callback with a string. The dispatcher maps
//! each [`TriggerFunction`] to an implementation once, at startup, and
//! resolves stored names through that table when a trigger fires.

use crate::error::SchedulerError;
use async_trait::async_trait;
use flowrun_workflow::{
    Engine, EventPayload, RunOutcome, StepId, Trigger, TriggerError, TriggerFunction,
};
use rootcause::prelude::Report;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Work performed when a trigger fires.
#[async_trait]
pub trait TriggerCallback: Send + Sync {
    /// Handles one firing of `trigger`.
    async fn call(
        &self,
        trigger: &Trigger,
        payload: Option<&EventPayload>,
    ) -> Result<(), Report<SchedulerError>>;
}

/// Maps callback names to implementations.
#[derive(Clone, Default)]
pub struct TriggerDispatcher {
    callbacks: HashMap<TriggerFunction, Arc<dyn TriggerCallback>>,
}

impl TriggerDispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher with the engine callbacks registered.
    #[must_use]
    pub fn with_engine(engine: Engine) -> Self {
        Self::new()
            .register(
                TriggerFunction::ResumeStep,
                ResumeStep {
                    engine: engine.clone(),
                },
            )
            .register(TriggerFunction::StartWorkflow, StartWorkflow { engine })
    }

    /// Registers the implementation of `function`.
    #[must_use]
    pub fn register(
        mut self,
        function: TriggerFunction,
        callback: impl TriggerCallback + 'static,
    ) -> Self {
        self.callbacks.insert(function, Arc::new(callback));
        self
    }

    /// Runs the callback named by `trigger`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown or has no registered
    /// implementation, or if the callback fails.
    #[instrument(skip_all, fields(trigger_id = %trigger.id, func = %trigger.func))]
    pub async fn dispatch(
        &self,
        trigger: &Trigger,
        payload: Option<&EventPayload>,
    ) -> Result<(), Report<SchedulerError>> {
        let dispatch_error = || SchedulerError::Dispatch {
            trigger_id: trigger.id,
        };
        let function = trigger.function().map_err(|e| e.context(dispatch_error()))?;
        let Some(callback) = self.callbacks.get(&function) else {
            let missing: Report<TriggerError> = TriggerError::UnregisteredFunction {
                name: trigger.func.clone(),
            }
            .into();
            return Err(missing.context(dispatch_error()));
        };
        debug!("dispatching trigger");
        callback.call(trigger, payload).await
    }
}

/// Advances the referenced execution past the step named in `details`.
pub struct ResumeStep {
    engine: Engine,
}

#[async_trait]
impl TriggerCallback for ResumeStep {
    async fn call(
        &self,
        trigger: &Trigger,
        _payload: Option<&EventPayload>,
    ) -> Result<(), Report<SchedulerError>> {
        let failed = || SchedulerError::Callback {
            function: TriggerFunction::ResumeStep.name(),
            trigger_id: trigger.id,
        };
        let execution_id = trigger.require_execution().map_err(|e| e.context(failed()))?;
        let step_id = trigger.details.as_deref().map(StepId::from).ok_or_else(|| {
            let missing: Report<TriggerError> =
                TriggerError::MissingReference { field: "details" }.into();
            missing.context(failed())
        })?;

        let outcome = self
            .engine
            .advance_workflow(execution_id, &step_id, BTreeMap::new(), None)
            .await
            .map_err(|e| e.context(failed()))?;
        if outcome == RunOutcome::Stale {
            warn!(%execution_id, %step_id, "resume trigger found nothing to advance");
        } else {
            debug!(%execution_id, %step_id, ?outcome, "resumed execution");
        }
        Ok(())
    }
}

/// Starts a run of the referenced workflow.
///
/// The run acts for the event's user when one is given, otherwise for the
/// workflow's creator. The event's context becomes the run's additional
/// context.
pub struct StartWorkflow {
    engine: Engine,
}

#[async_trait]
impl TriggerCallback for StartWorkflow {
    async fn call(
        &self,
        trigger: &Trigger,
        payload: Option<&EventPayload>,
    ) -> Result<(), Report<SchedulerError>> {
        let failed = || SchedulerError::Callback {
            function: TriggerFunction::StartWorkflow.name(),
            trigger_id: trigger.id,
        };
        let workflow_id = trigger.require_workflow().map_err(|e| e.context(failed()))?;
        let Some(workflow) = self
            .engine
            .load_workflow(workflow_id)
            .await
            .map_err(|e| e.context(failed()))?
        else {
            warn!(%workflow_id, "trigger references a missing workflow");
            return Ok(());
        };

        let user = payload
            .and_then(|p| p.user_id.clone())
            .unwrap_or_else(|| workflow.creator_user_id.clone());
        let context = payload.map(|p| p.context.clone()).unwrap_or_default();

        let started = self
            .engine
            .start_workflow(&workflow, &user, context, None)
            .await
            .map_err(|e| e.context(failed()))?;
        if let Some(run) = started {
            info!(%workflow_id, execution_id = %run.execution_id, "trigger started workflow");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flowrun_core::TriggerId;
    use flowrun_workflow::steps::builtin_registry;
    use flowrun_workflow::{
        AccessToken, ExecutionStore, LogNotifier, MemoryStore, NewTrigger, Step, TriggerKind,
        Workflow,
    };

    fn engine(store: &Arc<MemoryStore>) -> Engine {
        Engine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(builtin_registry(store.clone())),
            Arc::new(LogNotifier),
        )
    }

    #[tokio::test]
    async fn unknown_function_name_is_unregistered() {
        let dispatcher = TriggerDispatcher::new();
        let trigger = Trigger {
            func: "steps.delay.restart".to_string(),
            ..Trigger::from_new(
                TriggerId::new(),
                NewTrigger::time(Utc::now(), TriggerFunction::ResumeStep),
            )
        };
        let err = dispatcher.dispatch(&trigger, None).await.expect_err("unknown");
        assert!(err.to_string().contains("failed to dispatch trigger"));
    }

    #[tokio::test]
    async fn known_but_unwired_function_is_an_error() {
        let dispatcher = TriggerDispatcher::new();
        let trigger = Trigger::from_new(
            TriggerId::new(),
            NewTrigger::time(Utc::now(), TriggerFunction::ResumeStep),
        );
        assert!(dispatcher.dispatch(&trigger, None).await.is_err());
    }

    #[tokio::test]
    async fn start_workflow_uses_event_user_and_context() {
        let store = Arc::new(MemoryStore::new());
        let workflow = Workflow::new("Welcome", "U0")
            .with_access_token(AccessToken::new("xoxb"))
            .with_step(Step::new("stop").with_id("park"));
        store.put_workflow(workflow.clone());
        let dispatcher = TriggerDispatcher::with_engine(engine(&store));

        let trigger = Trigger::from_new(
            TriggerId::new(),
            NewTrigger::event(TriggerKind::MemberJoin, "C1", TriggerFunction::StartWorkflow)
                .with_workflow(workflow.id),
        );
        let payload = EventPayload {
            user_id: Some("U77".to_string()),
            context: BTreeMap::from([("channel".to_string(), "C1".to_string())]),
        };
        dispatcher
            .dispatch(&trigger, Some(&payload))
            .await
            .expect("dispatch");

        assert_eq!(store.execution_count(), 1);
    }

    #[tokio::test]
    async fn resume_without_details_is_missing_reference() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = TriggerDispatcher::with_engine(engine(&store));
        let trigger = Trigger::from_new(
            TriggerId::new(),
            NewTrigger::time(Utc::now(), TriggerFunction::ResumeStep)
                .with_execution(flowrun_core::ExecutionId::new()),
        );
        let err = dispatcher.dispatch(&trigger, None).await.expect_err("no details");
        assert!(err.to_string().contains("callback step.resume failed"));
    }

    #[tokio::test]
    async fn resume_advances_delayed_execution() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        let workflow = Workflow::new("Waiter", "U0")
            .with_access_token(AccessToken::new("xoxb"))
            .with_step(Step::new("delay").with_id("wait").with_input("ms", "0"))
            .with_step(Step::new("stop").with_id("park"));
        store.put_workflow(workflow.clone());

        let run = engine
            .start_workflow(&workflow, "U1", BTreeMap::new(), None)
            .await
            .expect("start")
            .expect("started");
        let triggers = store.all_triggers();
        assert_eq!(triggers.len(), 1);

        TriggerDispatcher::with_engine(engine)
            .dispatch(&triggers[0], None)
            .await
            .expect("dispatch");

        let exec = store
            .get_execution(run.execution_id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(exec.step_index, 1);
    }
}
