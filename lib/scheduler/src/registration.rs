//! Creating and removing workflow triggers.

use crate::error::{ScheduleError, SchedulerError};
use crate::schedule::CronSchedule;
use chrono::Utc;
use flowrun_core::WorkflowId;
use flowrun_workflow::{NewTrigger, Trigger, TriggerFunction, TriggerKind, TriggerStore};
use rootcause::prelude::Report;
use tracing::{debug, info, instrument};

/// Validates `expression` and stores a cron trigger that starts `workflow_id`.
///
/// # Errors
///
/// Returns an error if the expression is invalid or fires more than once
/// per hour, in which case nothing is stored, or if storage fails.
#[instrument(skip(store))]
pub async fn create_cron_trigger(
    store: &dyn TriggerStore,
    expression: &str,
    workflow_id: WorkflowId,
) -> Result<Trigger, Report<SchedulerError>> {
    let failed = || SchedulerError::RegistrationFailed {
        kind: TriggerKind::Cron,
    };
    let (schedule, first) = CronSchedule::validate(expression, Utc::now()).map_err(|e| {
        let invalid: Report<ScheduleError> = e.into();
        invalid.context(failed())
    })?;

    let trigger = store
        .insert_trigger(
            NewTrigger::cron(schedule.expression(), TriggerFunction::StartWorkflow)
                .with_workflow(workflow_id),
        )
        .await
        .map_err(|e| e.context(failed()))?;
    info!(trigger_id = %trigger.id, next = %first, "created cron trigger");
    Ok(trigger)
}

/// Stores an event trigger that starts `workflow_id` when an event of
/// `kind` arrives for `key`.
///
/// # Errors
///
/// Returns an error if `kind` is not an event kind or if storage fails.
#[instrument(skip(store))]
pub async fn create_event_trigger(
    store: &dyn TriggerStore,
    kind: TriggerKind,
    key: &str,
    workflow_id: WorkflowId,
) -> Result<Trigger, Report<SchedulerError>> {
    if !kind.is_event() {
        return Err(SchedulerError::RegistrationFailed { kind }.into());
    }
    let trigger = store
        .insert_trigger(
            NewTrigger::event(kind, key, TriggerFunction::StartWorkflow).with_workflow(workflow_id),
        )
        .await
        .map_err(|e| e.context(SchedulerError::RegistrationFailed { kind }))?;
    debug!(trigger_id = %trigger.id, "created event trigger");
    Ok(trigger)
}

/// Deletes every trigger owned by `workflow_id`. Returns how many were removed.
///
/// # Errors
///
/// Returns an error if storage fails.
pub async fn remove_workflow_triggers(
    store: &dyn TriggerStore,
    workflow_id: WorkflowId,
) -> Result<u64, Report<SchedulerError>> {
    let removed = store
        .delete_triggers_for_workflow(workflow_id)
        .await
        .map_err(|e| {
            e.context(SchedulerError::Storage {
                operation: "removing workflow triggers",
            })
        })?;
    debug!(%workflow_id, removed, "removed workflow triggers");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowrun_workflow::MemoryStore;

    #[tokio::test]
    async fn sub_hourly_cron_is_rejected_and_never_persisted() {
        let store = MemoryStore::new();
        let err = create_cron_trigger(&store, "*/5 * * * *", WorkflowId::new())
            .await
            .expect_err("too frequent");
        assert!(err.to_string().contains("cron trigger registration failed"));
        assert!(store.all_triggers().is_empty());
    }

    #[tokio::test]
    async fn six_field_cron_is_rejected() {
        let store = MemoryStore::new();
        assert!(
            create_cron_trigger(&store, "0 0 9 * * *", WorkflowId::new())
                .await
                .is_err()
        );
        assert!(store.all_triggers().is_empty());
    }

    #[tokio::test]
    async fn daily_cron_is_stored_for_workflow() {
        let store = MemoryStore::new();
        let workflow_id = WorkflowId::new();
        let trigger = create_cron_trigger(&store, "30 9 * * 1-5", workflow_id)
            .await
            .expect("valid");

        assert_eq!(trigger.kind, TriggerKind::Cron);
        assert_eq!(trigger.val_string.as_deref(), Some("30 9 * * 1-5"));
        assert_eq!(trigger.workflow_id, Some(workflow_id));
        assert_eq!(
            trigger.function().expect("known"),
            TriggerFunction::StartWorkflow
        );
    }

    #[tokio::test]
    async fn event_trigger_requires_event_kind() {
        let store = MemoryStore::new();
        let err = create_event_trigger(&store, TriggerKind::Time, "C1", WorkflowId::new())
            .await
            .expect_err("time is not an event");
        assert!(err.to_string().contains("time trigger registration failed"));

        let trigger =
            create_event_trigger(&store, TriggerKind::Reaction, "tada", WorkflowId::new())
                .await
                .expect("reaction");
        assert_eq!(trigger.val_string.as_deref(), Some("tada"));
    }

    #[tokio::test]
    async fn removing_workflow_triggers_leaves_others() {
        let store = MemoryStore::new();
        let mine = WorkflowId::new();
        let other = WorkflowId::new();
        create_cron_trigger(&store, "0 9 * * *", mine)
            .await
            .expect("cron");
        create_event_trigger(&store, TriggerKind::Message, "C1", mine)
            .await
            .expect("event");
        create_event_trigger(&store, TriggerKind::Message, "C1", other)
            .await
            .expect("event");

        assert_eq!(remove_workflow_triggers(&store, mine).await.expect("remove"), 2);
        let left = store.all_triggers();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].workflow_id, Some(other));
    }
}
