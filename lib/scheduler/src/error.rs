//! Error types for the scheduler crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ScheduleError`: Errors from cron expression validation and evaluation
//! - `SchedulerError`: High-level wrapper for context

use flowrun_core::TriggerId;
use flowrun_workflow::TriggerKind;
use std::fmt;

/// Errors from schedule operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Invalid cron expression.
    InvalidCronExpression { expression: String, reason: String },
    /// The schedule fires more often than once per hour.
    TooFrequent {
        expression: String,
        interval_minutes: i64,
    },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCronExpression { expression, reason } => {
                write!(f, "invalid cron expression '{expression}': {reason}")
            }
            Self::TooFrequent {
                expression,
                interval_minutes,
            } => write!(
                f,
                "cron expression '{expression}' fires every {interval_minutes} minutes; at most once per hour is allowed"
            ),
        }
    }
}

impl std::error::Error for ScheduleError {}

/// High-level scheduler errors.
///
/// Use these to add context when wrapping lower-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Resolving a trigger's callback failed (use as context wrapper).
    Dispatch { trigger_id: TriggerId },
    /// Trigger storage failed during a tick or lookup.
    Storage { operation: &'static str },
    /// A callback failed while handling a trigger.
    Callback {
        function: &'static str,
        trigger_id: TriggerId,
    },
    /// Creating a trigger failed.
    RegistrationFailed { kind: TriggerKind },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispatch { trigger_id } => {
                write!(f, "failed to dispatch trigger {trigger_id}")
            }
            Self::Storage { operation } => {
                write!(f, "trigger storage failed during {operation}")
            }
            Self::Callback {
                function,
                trigger_id,
            } => write!(f, "callback {function} failed for trigger {trigger_id}"),
            Self::RegistrationFailed { kind } => {
                write!(f, "{kind} trigger registration failed")
            }
        }
    }
}

impl std::error::Error for SchedulerError {}
