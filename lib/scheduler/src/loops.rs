//! Polling loops for time and cron triggers.
//!
//! Both loops tick on a fixed interval for the life of the process. Fired
//! callbacks are spawned so a long continuation never delays the next tick.

use crate::dispatch::TriggerDispatcher;
use crate::error::SchedulerError;
use crate::schedule::CronSchedule;
use chrono::{DateTime, Utc};
use flowrun_core::TriggerId;
use flowrun_workflow::{Trigger, TriggerFilter, TriggerKind, TriggerStore};
use rootcause::prelude::Report;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default tick interval for both loops.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Shortest tick interval either loop accepts.
pub const MIN_TICK: Duration = Duration::from_millis(1);

fn spawn_dispatch(set: &mut JoinSet<()>, dispatcher: &Arc<TriggerDispatcher>, trigger: Trigger) {
    let dispatcher = Arc::clone(dispatcher);
    set.spawn(async move {
        if let Err(e) = dispatcher.dispatch(&trigger, None).await {
            error!(trigger_id = %trigger.id, error = %e, "trigger callback failed");
        }
    });
}

/// Fires one-shot `time` triggers whose fire time has passed.
///
/// Due triggers are deleted before their callbacks run, so a crash between
/// the two loses the firing rather than repeating it.
pub struct TimeTriggerLoop {
    triggers: Arc<dyn TriggerStore>,
    dispatcher: Arc<TriggerDispatcher>,
    interval: Duration,
}

impl TimeTriggerLoop {
    /// Creates the loop.
    #[must_use]
    pub fn new(triggers: Arc<dyn TriggerStore>, dispatcher: Arc<TriggerDispatcher>) -> Self {
        Self {
            triggers,
            dispatcher,
            interval: DEFAULT_TICK,
        }
    }

    /// Sets the tick interval, raised to [`MIN_TICK`] if shorter.
    #[must_use]
    pub fn with_tick(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_TICK);
        self
    }

    /// Runs one tick and returns the spawned callbacks.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or deleting the due batch fails. Nothing
    /// is dispatched in that case.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<JoinSet<()>, Report<SchedulerError>> {
        let due = self
            .triggers
            .find_triggers(&TriggerFilter::due(now))
            .await
            .map_err(|e| {
                e.context(SchedulerError::Storage {
                    operation: "loading due time triggers",
                })
            })?;

        for trigger in &due {
            self.triggers.delete_trigger(trigger.id).await.map_err(|e| {
                e.context(SchedulerError::Storage {
                    operation: "deleting due time triggers",
                })
            })?;
        }

        let mut set = JoinSet::new();
        if !due.is_empty() {
            debug!(count = due.len(), "firing time triggers");
        }
        for trigger in due {
            spawn_dispatch(&mut set, &self.dispatcher, trigger);
        }
        Ok(set)
    }

    /// Ticks forever.
    pub async fn run(self) {
        info!(tick_ms = self.interval.as_millis() as u64, "time trigger loop started");
        let mut interval = tokio::time::interval(self.interval);
        loop {
            interval.tick().await;
            match self.tick(Utc::now()).await {
                Ok(mut set) => set.detach_all(),
                Err(e) => error!(error = %e, "failed to execute time triggers"),
            }
        }
    }
}

/// Fires recurring `cron` triggers.
///
/// A trigger fires when its next occurrence after its anchor has passed.
/// The anchor is the last time this loop fired the trigger, or the loop's
/// start time if it has not fired since the process started; occurrences
/// missed while the process was down are not replayed.
pub struct CronTriggerLoop {
    triggers: Arc<dyn TriggerStore>,
    dispatcher: Arc<TriggerDispatcher>,
    interval: Duration,
    started_at: DateTime<Utc>,
    last_fired: HashMap<TriggerId, DateTime<Utc>>,
}

impl CronTriggerLoop {
    /// Creates the loop, anchored at the current time.
    #[must_use]
    pub fn new(triggers: Arc<dyn TriggerStore>, dispatcher: Arc<TriggerDispatcher>) -> Self {
        Self {
            triggers,
            dispatcher,
            interval: DEFAULT_TICK,
            started_at: Utc::now(),
            last_fired: HashMap::new(),
        }
    }

    /// Sets the tick interval, raised to [`MIN_TICK`] if shorter.
    #[must_use]
    pub fn with_tick(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_TICK);
        self
    }

    /// Overrides the start-time anchor.
    #[must_use]
    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// When the trigger last fired in this process.
    #[must_use]
    pub fn last_fired(&self, id: TriggerId) -> Option<DateTime<Utc>> {
        self.last_fired.get(&id).copied()
    }

    /// Runs one tick and returns the spawned callbacks.
    ///
    /// A trigger with an unparseable expression is skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if loading the cron triggers fails.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<JoinSet<()>, Report<SchedulerError>> {
        let triggers = self
            .triggers
            .triggers_by_kind(TriggerKind::Cron)
            .await
            .map_err(|e| {
                e.context(SchedulerError::Storage {
                    operation: "loading cron triggers",
                })
            })?;

        // Forget triggers that no longer exist.
        self.last_fired
            .retain(|id, _| triggers.iter().any(|t| t.id == *id));

        let mut set = JoinSet::new();
        for trigger in triggers {
            let expression = trigger.val_string.as_deref().unwrap_or_default();
            let schedule = match CronSchedule::parse(expression) {
                Ok(schedule) => schedule,
                Err(e) => {
                    warn!(trigger_id = %trigger.id, error = %e, "skipping cron trigger");
                    continue;
                }
            };
            let anchor = self
                .last_fired
                .get(&trigger.id)
                .copied()
                .unwrap_or(self.started_at);
            if schedule.next_after(anchor).is_some_and(|next| next < now) {
                debug!(trigger_id = %trigger.id, "firing cron trigger");
                self.last_fired.insert(trigger.id, now);
                spawn_dispatch(&mut set, &self.dispatcher, trigger);
            }
        }
        Ok(set)
    }

    /// Ticks forever.
    pub async fn run(mut self) {
        info!(tick_ms = self.interval.as_millis() as u64, "cron trigger loop started");
        let mut interval = tokio::time::interval(self.interval);
        loop {
            interval.tick().await;
            match self.tick(Utc::now()).await {
                Ok(mut set) => set.detach_all(),
                Err(e) => error!(error = %e, "failed to evaluate cron triggers"),
            }
        }
    }
}
