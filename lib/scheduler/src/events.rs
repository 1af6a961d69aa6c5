//! Routing inbound platform events to matching triggers.

use crate::dispatch::TriggerDispatcher;
use crate::error::SchedulerError;
use flowrun_workflow::{EventPayload, TriggerKind, TriggerStore};
use rootcause::prelude::Report;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Finds the triggers an event matches and runs their callbacks.
#[derive(Clone)]
pub struct EventRouter {
    triggers: Arc<dyn TriggerStore>,
    dispatcher: Arc<TriggerDispatcher>,
}

impl EventRouter {
    /// Creates a router.
    #[must_use]
    pub fn new(triggers: Arc<dyn TriggerStore>, dispatcher: Arc<TriggerDispatcher>) -> Self {
        Self {
            triggers,
            dispatcher,
        }
    }

    /// Dispatches every trigger of `kind` keyed by `key`.
    ///
    /// Callbacks run in order; a failing callback is logged and the rest
    /// still run. Returns the number of callbacks that succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the trigger lookup fails.
    #[instrument(skip(self, payload))]
    pub async fn route(
        &self,
        kind: TriggerKind,
        key: &str,
        payload: &EventPayload,
    ) -> Result<usize, Report<SchedulerError>> {
        let matched = self
            .triggers
            .triggers_by_kind_and_key(kind, key)
            .await
            .map_err(|e| {
                e.context(SchedulerError::Storage {
                    operation: "looking up event triggers",
                })
            })?;
        debug!(matched = matched.len(), "routing event");

        let mut fired = 0;
        for trigger in &matched {
            match self.dispatcher.dispatch(trigger, Some(payload)).await {
                Ok(()) => fired += 1,
                Err(e) => error!(trigger_id = %trigger.id, error = %e, "event callback failed"),
            }
        }
        Ok(fired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::TriggerCallback;
    use async_trait::async_trait;
    use flowrun_workflow::{MemoryStore, NewTrigger, Trigger, TriggerFunction};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl TriggerCallback for Arc<Recorder> {
        async fn call(
            &self,
            _trigger: &Trigger,
            payload: Option<&EventPayload>,
        ) -> Result<(), Report<SchedulerError>> {
            self.seen
                .lock()
                .expect("lock")
                .push(payload.and_then(|p| p.user_id.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn routes_only_matching_kind_and_key() {
        let store = Arc::new(MemoryStore::new());
        for (kind, key) in [
            (TriggerKind::MemberJoin, "C1"),
            (TriggerKind::MemberJoin, "C2"),
            (TriggerKind::Message, "C1"),
        ] {
            store
                .insert_trigger(NewTrigger::event(kind, key, TriggerFunction::StartWorkflow))
                .await
                .expect("insert");
        }
        let recorder = Arc::new(Recorder::default());
        let dispatcher =
            TriggerDispatcher::new().register(TriggerFunction::StartWorkflow, recorder.clone());
        let router = EventRouter::new(store, Arc::new(dispatcher));

        let payload = EventPayload {
            user_id: Some("U5".to_string()),
            context: BTreeMap::new(),
        };
        let fired = router
            .route(TriggerKind::MemberJoin, "C1", &payload)
            .await
            .expect("route");

        assert_eq!(fired, 1);
        assert_eq!(
            *recorder.seen.lock().expect("lock"),
            vec![Some("U5".to_string())]
        );
    }

    #[tokio::test]
    async fn unwired_callback_is_logged_not_returned() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_trigger(NewTrigger::event(
                TriggerKind::Reaction,
                "tada",
                TriggerFunction::StartWorkflow,
            ))
            .await
            .expect("insert");
        let router = EventRouter::new(store, Arc::new(TriggerDispatcher::new()));

        let fired = router
            .route(TriggerKind::Reaction, "tada", &EventPayload::default())
            .await
            .expect("route");
        assert_eq!(fired, 0);
    }
}
