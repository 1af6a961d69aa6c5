//! Trigger records.
//!
//! A trigger is a persisted "wake me up" record. Its kind decides how it is
//! matched:
//!
//! - `time`: `val_number` holds the fire time in epoch milliseconds; the
//!   record is deleted when it fires
//! - `cron`: `val_string` holds a five-field cron expression; the record
//!   fires repeatedly
//! - event kinds (`message`, `reaction`, `member_join`): `val_string`
//!   holds the matching key, e.g. a channel id
//!
//! `func` names the callback run on firing. It is stored as a string and
//! resolved through [`TriggerFunction`] at dispatch.

use crate::error::TriggerError;
use chrono::{DateTime, Utc};
use flowrun_core::{ExecutionId, TriggerId, WorkflowId};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Trigger kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// One-shot timer.
    Time,
    /// Recurring schedule.
    Cron,
    /// A message was posted in a channel.
    Message,
    /// A reaction was added.
    Reaction,
    /// A member joined a channel.
    MemberJoin,
}

impl TriggerKind {
    /// Returns the stored tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Cron => "cron",
            Self::Message => "message",
            Self::Reaction => "reaction",
            Self::MemberJoin => "member_join",
        }
    }

    /// True for kinds fired by inbound platform events.
    #[must_use]
    pub fn is_event(&self) -> bool {
        matches!(self, Self::Message | Self::Reaction | Self::MemberJoin)
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time" => Ok(Self::Time),
            "cron" => Ok(Self::Cron),
            "message" => Ok(Self::Message),
            "reaction" => Ok(Self::Reaction),
            "member_join" => Ok(Self::MemberJoin),
            other => Err(TriggerError::UnknownKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// Callbacks a trigger may name.
///
/// Records store [`TriggerFunction::name`]; the mapping from name to
/// implementation is fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerFunction {
    /// Advance the referenced execution past the step id held in `details`.
    ResumeStep,
    /// Start a run of the referenced workflow.
    StartWorkflow,
}

impl TriggerFunction {
    /// All known functions.
    pub const ALL: [Self; 2] = [Self::ResumeStep, Self::StartWorkflow];

    /// Returns the stored name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResumeStep => "step.resume",
            Self::StartWorkflow => "workflow.start",
        }
    }
}

impl fmt::Display for TriggerFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TriggerFunction {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| TriggerError::UnregisteredFunction {
                name: s.to_string(),
            })
    }
}

/// A persisted trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Unique identifier.
    pub id: TriggerId,
    /// Kind.
    pub kind: TriggerKind,
    /// String matching key (cron expression, channel id, ...).
    pub val_string: Option<String>,
    /// Numeric matching key (fire time in epoch millis for `time`).
    pub val_number: Option<i64>,
    /// Callback name.
    pub func: String,
    /// Opaque payload handed to the callback.
    pub details: Option<String>,
    /// Owning workflow.
    pub workflow_id: Option<WorkflowId>,
    /// Owning execution.
    pub execution_id: Option<ExecutionId>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl Trigger {
    /// Materializes a record from insert fields.
    #[must_use]
    pub fn from_new(id: TriggerId, new: NewTrigger) -> Self {
        Self {
            id,
            kind: new.kind,
            val_string: new.val_string,
            val_number: new.val_number,
            func: new.func,
            details: new.details,
            workflow_id: new.workflow_id,
            execution_id: new.execution_id,
            created_at: Utc::now(),
        }
    }

    /// Resolves the stored callback name.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredFunction` if the name is not known.
    pub fn function(&self) -> Result<TriggerFunction, Report<TriggerError>> {
        Ok(self.func.parse::<TriggerFunction>()?)
    }

    /// Returns the owning workflow or a `MissingReference` error.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference` if the record has no workflow id.
    pub fn require_workflow(&self) -> Result<WorkflowId, Report<TriggerError>> {
        self.workflow_id.ok_or_else(|| {
            TriggerError::MissingReference {
                field: "workflow_id",
            }
            .into()
        })
    }

    /// Returns the owning execution or a `MissingReference` error.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference` if the record has no execution id.
    pub fn require_execution(&self) -> Result<ExecutionId, Report<TriggerError>> {
        self.execution_id.ok_or_else(|| {
            TriggerError::MissingReference {
                field: "execution_id",
            }
            .into()
        })
    }
}

/// Fields supplied when inserting a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrigger {
    pub kind: TriggerKind,
    pub val_string: Option<String>,
    pub val_number: Option<i64>,
    pub func: String,
    pub details: Option<String>,
    pub workflow_id: Option<WorkflowId>,
    pub execution_id: Option<ExecutionId>,
}

impl NewTrigger {
    fn bare(kind: TriggerKind, func: TriggerFunction) -> Self {
        Self {
            kind,
            val_string: None,
            val_number: None,
            func: func.name().to_string(),
            details: None,
            workflow_id: None,
            execution_id: None,
        }
    }

    /// A one-shot trigger firing at `at`.
    #[must_use]
    pub fn time(at: DateTime<Utc>, func: TriggerFunction) -> Self {
        Self {
            val_number: Some(at.timestamp_millis()),
            ..Self::bare(TriggerKind::Time, func)
        }
    }

    /// A recurring trigger. The expression is not validated here; go
    /// through the scheduler's cron validation before inserting.
    #[must_use]
    pub fn cron(expression: impl Into<String>, func: TriggerFunction) -> Self {
        Self {
            val_string: Some(expression.into()),
            ..Self::bare(TriggerKind::Cron, func)
        }
    }

    /// An event trigger matched by `key`.
    #[must_use]
    pub fn event(kind: TriggerKind, key: impl Into<String>, func: TriggerFunction) -> Self {
        Self {
            val_string: Some(key.into()),
            ..Self::bare(kind, func)
        }
    }

    /// Sets the callback payload.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Sets the owning workflow.
    #[must_use]
    pub fn with_workflow(mut self, workflow_id: WorkflowId) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    /// Sets the owning execution.
    #[must_use]
    pub fn with_execution(mut self, execution_id: ExecutionId) -> Self {
        self.execution_id = Some(execution_id);
        self
    }
}

/// Predicate over a trigger's typed columns. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerFilter {
    pub kind: Option<TriggerKind>,
    pub val_string: Option<String>,
    /// Matches records whose `val_number` is strictly below this value.
    pub val_number_before: Option<i64>,
    pub workflow_id: Option<WorkflowId>,
    pub execution_id: Option<ExecutionId>,
}

impl TriggerFilter {
    /// Matches one kind.
    #[must_use]
    pub fn kind(kind: TriggerKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// `time` triggers due strictly before `now`.
    #[must_use]
    pub fn due(now: DateTime<Utc>) -> Self {
        Self {
            val_number_before: Some(now.timestamp_millis()),
            ..Self::kind(TriggerKind::Time)
        }
    }

    /// Restricts to a string key.
    #[must_use]
    pub fn with_val_string(mut self, key: impl Into<String>) -> Self {
        self.val_string = Some(key.into());
        self
    }

    /// Restricts to a workflow.
    #[must_use]
    pub fn with_workflow(mut self, workflow_id: WorkflowId) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    /// Returns true if the record satisfies every set field.
    #[must_use]
    pub fn matches(&self, trigger: &Trigger) -> bool {
        self.kind.is_none_or(|k| k == trigger.kind)
            && self
                .val_string
                .as_ref()
                .is_none_or(|v| trigger.val_string.as_ref() == Some(v))
            && self
                .val_number_before
                .is_none_or(|n| trigger.val_number.is_some_and(|v| v < n))
            && self
                .workflow_id
                .is_none_or(|w| trigger.workflow_id == Some(w))
            && self
                .execution_id
                .is_none_or(|e| trigger.execution_id == Some(e))
    }
}

/// Data an inbound event carries to a trigger callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    /// User that caused the event.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Values exposed to the started run as context tokens.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn kind_round_trips_through_tag() {
        for kind in [
            TriggerKind::Time,
            TriggerKind::Cron,
            TriggerKind::Message,
            TriggerKind::Reaction,
            TriggerKind::MemberJoin,
        ] {
            assert_eq!(kind.as_str().parse::<TriggerKind>(), Ok(kind));
        }
        assert!(matches!(
            "webhook".parse::<TriggerKind>(),
            Err(TriggerError::UnknownKind { .. })
        ));
    }

    #[test]
    fn function_names_resolve() {
        assert_eq!(
            "step.resume".parse::<TriggerFunction>(),
            Ok(TriggerFunction::ResumeStep)
        );
        assert_eq!(
            "steps.delay.restart".parse::<TriggerFunction>(),
            Err(TriggerError::UnregisteredFunction {
                name: "steps.delay.restart".to_string()
            })
        );
    }

    #[test]
    fn time_trigger_stores_epoch_millis() {
        let at = Utc::now();
        let new = NewTrigger::time(at, TriggerFunction::ResumeStep).with_details("s1");
        assert_eq!(new.kind, TriggerKind::Time);
        assert_eq!(new.val_number, Some(at.timestamp_millis()));
        assert_eq!(new.func, "step.resume");
        assert_eq!(new.details.as_deref(), Some("s1"));
    }

    #[test]
    fn due_filter_only_matches_past_time_triggers() {
        let now = Utc::now();
        let past = Trigger::from_new(
            TriggerId::new(),
            NewTrigger::time(now - Duration::seconds(5), TriggerFunction::ResumeStep),
        );
        let future = Trigger::from_new(
            TriggerId::new(),
            NewTrigger::time(now + Duration::seconds(5), TriggerFunction::ResumeStep),
        );
        let cron = Trigger::from_new(
            TriggerId::new(),
            NewTrigger::cron("0 * * * *", TriggerFunction::StartWorkflow),
        );

        let filter = TriggerFilter::due(now);
        assert!(filter.matches(&past));
        assert!(!filter.matches(&future));
        assert!(!filter.matches(&cron));
    }

    #[test]
    fn missing_references_are_reported() {
        let trigger = Trigger::from_new(
            TriggerId::new(),
            NewTrigger::event(TriggerKind::Message, "C1", TriggerFunction::StartWorkflow),
        );
        let err = trigger.require_workflow().expect_err("no workflow");
        assert!(err.to_string().contains("workflow_id"));
        assert_eq!(trigger.function().expect("known"), TriggerFunction::StartWorkflow);
    }
}
