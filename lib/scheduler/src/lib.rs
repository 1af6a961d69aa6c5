//! Scheduler for workflow triggers.
//!
//! This crate provides:
//!
//! - **Schedules**: Cron validation (five fields, at most hourly) and evaluation
//! - **Dispatch**: The startup-built table from trigger function names to callbacks
//! - **Loops**: Polling loops for one-shot time triggers and recurring cron triggers
//! - **Event Router**: Routing inbound platform events to matching triggers
//! - **Registration**: Creating and removing workflow triggers

pub mod dispatch;
pub mod error;
pub mod events;
pub mod loops;
pub mod registration;
pub mod schedule;

pub use dispatch::{ResumeStep, StartWorkflow, TriggerCallback, TriggerDispatcher};
pub use error::{ScheduleError, SchedulerError};
pub use events::EventRouter;
pub use loops::{CronTriggerLoop, DEFAULT_TICK, MIN_TICK, TimeTriggerLoop};
pub use registration::{create_cron_trigger, create_event_trigger, remove_workflow_triggers};
pub use schedule::{CronSchedule, MIN_INTERVAL};
