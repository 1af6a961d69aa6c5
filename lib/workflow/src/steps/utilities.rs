//! Run control steps: delay and stop.

use crate::error::StepError;
use crate::step::{
    DataType, IoSpec, StepContext, StepFunction, StepOutcome, StepRegistryBuilder, StepSpec,
};
use crate::store::TriggerStore;
use crate::trigger::{NewTrigger, TriggerFunction};
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use rootcause::prelude::Report;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub(super) fn register(
    builder: StepRegistryBuilder,
    triggers: Arc<dyn TriggerStore>,
) -> StepRegistryBuilder {
    builder
        .register(
            "delay",
            StepSpec::new("Delay execution", "Utilities")
                .input(IoSpec::required("ms", "Time (in ms)", DataType::Text)),
            DelayStep::new(triggers),
        )
        .register(
            "stop",
            StepSpec::new("Stop the workflow", "Utilities"),
            StopStep,
        )
}

/// Suspends the run and schedules a one-shot timer that resumes it.
pub struct DelayStep {
    triggers: Arc<dyn TriggerStore>,
}

impl DelayStep {
    /// Creates the step over a trigger store.
    #[must_use]
    pub fn new(triggers: Arc<dyn TriggerStore>) -> Self {
        Self { triggers }
    }
}

fn parse_delay(raw: &str) -> Result<TimeDelta, Report<StepError>> {
    let invalid = |reason: &str| StepError::InvalidInput {
        input: "ms".to_string(),
        reason: format!("failed to parse sleep duration `{raw}`: {reason}"),
    };
    let ms = raw
        .trim()
        .parse::<f64>()
        .map_err(|e| invalid(&e.to_string()))?;
    if !ms.is_finite() {
        return Err(invalid("not a finite number").into());
    }
    Ok(TimeDelta::try_milliseconds(ms.round() as i64).ok_or_else(|| invalid("out of range"))?)
}

#[async_trait]
impl StepFunction for DelayStep {
    async fn run(
        &self,
        ctx: &StepContext,
        inputs: &BTreeMap<String, String>,
    ) -> Result<StepOutcome, Report<StepError>> {
        let delay = parse_delay(inputs.get("ms").map(String::as_str).unwrap_or_default())?;
        let fire_at = Utc::now()
            .checked_add_signed(delay)
            .ok_or_else(|| StepError::InvalidInput {
                input: "ms".to_string(),
                reason: "resume time out of range".to_string(),
            })?;

        let trigger = self
            .triggers
            .insert_trigger(
                NewTrigger::time(fire_at, TriggerFunction::ResumeStep)
                    .with_execution(ctx.execution_id)
                    .with_details(ctx.step_id.as_str()),
            )
            .await
            .map_err(|e| {
                e.context(StepError::Failed {
                    reason: "could not schedule resume".to_string(),
                })
            })?;

        debug!(trigger_id = %trigger.id, %fire_at, "delay scheduled");
        Ok(StepOutcome::Pending)
    }
}

/// Parks the run. Nothing resumes it.
pub struct StopStep;

#[async_trait]
impl StepFunction for StopStep {
    async fn run(
        &self,
        _ctx: &StepContext,
        _inputs: &BTreeMap<String, String>,
    ) -> Result<StepOutcome, Report<StepError>> {
        Ok(StepOutcome::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{AccessToken, StepId, Workflow};
    use crate::memory::MemoryStore;
    use crate::trigger::TriggerKind;
    use flowrun_core::ExecutionId;

    fn ctx() -> StepContext {
        StepContext {
            execution_id: ExecutionId::new(),
            step_id: StepId::from("wait"),
            trigger_user_id: "U1".to_string(),
            correlation_id: None,
            credential: AccessToken::new("xoxb"),
            workflow: Workflow::new("Waiter", "U1"),
        }
    }

    #[tokio::test]
    async fn delay_creates_resume_trigger_and_suspends() {
        let store = Arc::new(MemoryStore::new());
        let step = DelayStep::new(store.clone());
        let ctx = ctx();
        let before = Utc::now().timestamp_millis();

        let inputs = BTreeMap::from([("ms".to_string(), "1500".to_string())]);
        let outcome = step.run(&ctx, &inputs).await.expect("run");
        assert_eq!(outcome, StepOutcome::Pending);

        let triggers = store.all_triggers();
        assert_eq!(triggers.len(), 1);
        let trigger = &triggers[0];
        assert_eq!(trigger.kind, TriggerKind::Time);
        assert_eq!(trigger.func, "step.resume");
        assert_eq!(trigger.details.as_deref(), Some("wait"));
        assert_eq!(trigger.execution_id, Some(ctx.execution_id));
        assert!(trigger.val_number.expect("fire time") >= before + 1500);
    }

    #[tokio::test]
    async fn delay_rejects_non_numeric_duration() {
        let store = Arc::new(MemoryStore::new());
        let step = DelayStep::new(store.clone());
        let inputs = BTreeMap::from([("ms".to_string(), "soon".to_string())]);

        let err = step.run(&ctx(), &inputs).await.expect_err("invalid");
        assert!(err.to_string().contains("failed to parse sleep duration `soon`"));
        assert!(store.all_triggers().is_empty());
    }

    #[test]
    fn fractional_delays_round() {
        assert_eq!(parse_delay(" 2.6 ").expect("parse"), TimeDelta::milliseconds(3));
        assert!(parse_delay("inf").is_err());
    }

    #[tokio::test]
    async fn stop_is_pending() {
        let outcome = StopStep.run(&ctx(), &BTreeMap::new()).await.expect("run");
        assert_eq!(outcome, StepOutcome::Pending);
    }
}
