//! HTTP entry points.
//!
//! Manual starts, external step completions (button presses and the like),
//! inbound platform events and workflow/trigger management.

use crate::error::ApiError;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::Utc;
use flowrun_core::{ExecutionId, WorkflowId};
use flowrun_scheduler::{
    EventRouter, ScheduleError, SchedulerError, create_cron_trigger, create_event_trigger,
    remove_workflow_triggers,
};
use flowrun_workflow::{
    AccessToken, Engine, EventPayload, RunOutcome, Step, StepId, TriggerKind, TriggerStore,
    Workflow, WorkflowStore,
};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub workflows: Arc<dyn WorkflowStore>,
    pub triggers: Arc<dyn TriggerStore>,
    pub events: EventRouter,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/workflows/{id}", put(save_workflow).delete(delete_workflow))
        .route("/workflows/{id}/runs", post(start_run))
        .route("/workflows/{id}/triggers", post(create_trigger))
        .route(
            "/executions/{id}/steps/{step_id}/advance",
            post(advance_step),
        )
        .route("/events/{kind}/{key}", post(route_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse_path<T: FromStr>(segment: &'static str, value: &str) -> Result<T, ApiError> {
    T::from_str(value).map_err(|_| ApiError::InvalidPath {
        segment,
        value: value.to_string(),
    })
}

/// Where a run stands after a request, as returned to callers.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutcomeResponse {
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

impl From<&RunOutcome> for OutcomeResponse {
    fn from(outcome: &RunOutcome) -> Self {
        let (name, step_id) = match outcome {
            RunOutcome::Completed => ("completed", None),
            RunOutcome::Suspended { step_id } => ("suspended", Some(step_id)),
            RunOutcome::Halted { step_id } => ("halted", Some(step_id)),
            RunOutcome::Aborted { step_id } => ("aborted", Some(step_id)),
            RunOutcome::Abandoned => ("abandoned", None),
            RunOutcome::Stale => ("stale", None),
        };
        Self {
            outcome: name.to_string(),
            step_id: step_id.map(ToString::to_string),
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Body of `PUT /workflows/{id}`.
#[derive(Debug, Deserialize)]
pub struct WorkflowBody {
    pub name: String,
    pub creator_user_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

async fn save_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<WorkflowBody>,
) -> Result<StatusCode, ApiError> {
    let id: WorkflowId = parse_path("workflow id", &id)?;
    let existing = state
        .workflows
        .get_workflow(id)
        .await
        .map_err(ApiError::internal)?;

    let now = Utc::now();
    let workflow = Workflow {
        id,
        name: body.name,
        creator_user_id: body.creator_user_id,
        access_token: body.access_token.map(AccessToken::new),
        steps: body.steps,
        created_at: existing.as_ref().map_or(now, |w| w.created_at),
        updated_at: now,
    };
    state
        .workflows
        .save_workflow(&workflow)
        .await
        .map_err(ApiError::internal)?;

    tracing::info!(workflow_id = %id, steps = workflow.steps.len(), "saved workflow");
    Ok(if existing.is_some() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::CREATED
    })
}

async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: WorkflowId = parse_path("workflow id", &id)?;
    remove_workflow_triggers(state.triggers.as_ref(), id)
        .await
        .map_err(ApiError::internal)?;
    let deleted = state
        .workflows
        .delete_workflow(id)
        .await
        .map_err(ApiError::internal)?;
    if !deleted {
        return Err(ApiError::NotFound {
            entity: "workflow",
            id: id.to_string(),
        });
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Body of `POST /workflows/{id}/runs`.
#[derive(Debug, Deserialize)]
pub struct StartBody {
    pub user: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Response of `POST /workflows/{id}/runs`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub execution_id: String,
    #[serde(flatten)]
    pub outcome: OutcomeResponse,
}

async fn start_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StartBody>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let id: WorkflowId = parse_path("workflow id", &id)?;
    let workflow = state
        .engine
        .load_workflow(id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::NotFound {
            entity: "workflow",
            id: id.to_string(),
        })?;

    let started = state
        .engine
        .start_workflow(&workflow, &body.user, body.context, body.correlation_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::NotStarted {
            workflow_id: id.to_string(),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(StartResponse {
            execution_id: started.execution_id.to_string(),
            outcome: OutcomeResponse::from(&started.outcome),
        }),
    ))
}

/// Body of `POST /workflows/{id}/triggers`.
///
/// `key` is the cron expression for `cron` triggers and the matching key
/// (e.g. a channel id) for event triggers.
#[derive(Debug, Deserialize)]
pub struct TriggerBody {
    pub kind: TriggerKind,
    pub key: String,
}

/// Response of `POST /workflows/{id}/triggers`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub trigger_id: String,
}

async fn create_trigger(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TriggerBody>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    let id: WorkflowId = parse_path("workflow id", &id)?;
    let trigger = match body.kind {
        TriggerKind::Time => {
            return Err(ApiError::Rejected {
                details: "time triggers are created by running steps".to_string(),
            });
        }
        TriggerKind::Cron => create_cron_trigger(state.triggers.as_ref(), &body.key, id).await,
        kind => create_event_trigger(state.triggers.as_ref(), kind, &body.key, id).await,
    }
    .map_err(registration_error)?;

    Ok((
        StatusCode::CREATED,
        Json(TriggerResponse {
            trigger_id: trigger.id.to_string(),
        }),
    ))
}

/// An invalid schedule is the caller's fault; anything else is ours.
fn registration_error(report: Report<SchedulerError>) -> ApiError {
    let invalid = report
        .iter_reports()
        .find_map(|r| r.downcast_current_context::<ScheduleError>().map(ToString::to_string));
    match invalid {
        Some(details) => ApiError::Rejected { details },
        None => ApiError::internal(report),
    }
}

/// Body of `POST /executions/{id}/steps/{step_id}/advance`.
#[derive(Debug, Default, Deserialize)]
pub struct AdvanceBody {
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

async fn advance_step(
    State(state): State<AppState>,
    Path((id, step_id)): Path<(String, String)>,
    Json(body): Json<AdvanceBody>,
) -> Result<Json<OutcomeResponse>, ApiError> {
    let id: ExecutionId = parse_path("execution id", &id)?;
    let outcome = state
        .engine
        .advance_workflow(id, &StepId::from(step_id), body.outputs, body.correlation_id)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(OutcomeResponse::from(&outcome)))
}

/// Response of `POST /events/{kind}/{key}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    pub fired: usize,
}

async fn route_event(
    State(state): State<AppState>,
    Path((kind, key)): Path<(String, String)>,
    Json(payload): Json<EventPayload>,
) -> Result<Json<EventResponse>, ApiError> {
    let kind: TriggerKind = parse_path("trigger kind", &kind)?;
    if !kind.is_event() {
        return Err(ApiError::InvalidPath {
            segment: "trigger kind",
            value: kind.to_string(),
        });
    }
    let fired = state
        .events
        .route(kind, &key, &payload)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(EventResponse { fired }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, Response};
    use flowrun_scheduler::TriggerDispatcher;
    use flowrun_workflow::steps::builtin_registry;
    use flowrun_workflow::{ExecutionStore, LogNotifier, MemoryStore};
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(builtin_registry(store.clone())),
            Arc::new(LogNotifier),
        );
        let dispatcher = Arc::new(TriggerDispatcher::with_engine(engine.clone()));
        let state = AppState {
            engine,
            workflows: store.clone(),
            triggers: store.clone(),
            events: EventRouter::new(store.clone(), dispatcher),
        };
        (router(state), store)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: serde_json::Value) -> Response<Body> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        app.clone().oneshot(request).await.expect("response")
    }

    async fn json<T: DeserializeOwned>(response: Response<Body>) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    fn waiting_workflow(store: &MemoryStore) -> Workflow {
        let workflow = Workflow::new("Approval", "U0")
            .with_access_token(AccessToken::new("xoxb"))
            .with_step(Step::new("stop").with_id("await_button"))
            .with_step(
                Step::new("convert-user-to-ping")
                    .with_id("ping")
                    .with_input("value", "$!{ctx.trigger_user_id}"),
            );
        store.put_workflow(workflow.clone());
        workflow
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (app, _) = app();
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn start_then_advance_by_button() {
        let (app, store) = app();
        let workflow = waiting_workflow(&store);

        let response = send(
            &app,
            "POST",
            &format!("/workflows/{}/runs", workflow.id),
            serde_json::json!({"user": "U1"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let started: StartResponse = json(response).await;
        assert_eq!(started.outcome.outcome, "suspended");
        assert_eq!(started.outcome.step_id.as_deref(), Some("await_button"));

        let uri = format!(
            "/executions/{}/steps/await_button/advance",
            started.execution_id
        );
        let first: OutcomeResponse = json(
            send(&app, "POST", &uri, serde_json::json!({"outputs": {"choice": "yes"}})).await,
        )
        .await;
        assert_eq!(first.outcome, "completed");

        // A double click is absorbed.
        let second: OutcomeResponse =
            json(send(&app, "POST", &uri, serde_json::json!({})).await).await;
        assert_eq!(second.outcome, "stale");

        let id: ExecutionId = started.execution_id.parse().expect("id");
        let exec = store
            .get_execution(id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(exec.state.output(&StepId::from("await_button"), "choice"), Some("yes"));
        assert_eq!(exec.state.output(&StepId::from("ping"), "value"), Some("<@U1>"));
    }

    #[tokio::test]
    async fn unknown_workflow_is_404_and_bad_id_is_400() {
        let (app, _) = app();
        let missing = send(
            &app,
            "POST",
            &format!("/workflows/{}/runs", WorkflowId::new()),
            serde_json::json!({"user": "U1"}),
        )
        .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let bad = send(&app, "POST", "/workflows/nope/runs", serde_json::json!({"user": "U1"})).await;
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn workflow_without_credential_is_conflict() {
        let (app, store) = app();
        let workflow = Workflow::new("Draft", "U0").with_step(Step::new("stop"));
        store.put_workflow(workflow.clone());

        let response = send(
            &app,
            "POST",
            &format!("/workflows/{}/runs", workflow.id),
            serde_json::json!({"user": "U1"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(store.execution_count(), 0);
    }

    #[tokio::test]
    async fn member_join_event_starts_workflow() {
        let (app, store) = app();
        let workflow = waiting_workflow(&store);

        let created = send(
            &app,
            "POST",
            &format!("/workflows/{}/triggers", workflow.id),
            serde_json::json!({"kind": "member_join", "key": "C1"}),
        )
        .await;
        assert_eq!(created.status(), StatusCode::CREATED);

        let fired: EventResponse = json(
            send(
                &app,
                "POST",
                "/events/member_join/C1",
                serde_json::json!({"user_id": "U9"}),
            )
            .await,
        )
        .await;
        assert_eq!(fired.fired, 1);
        assert_eq!(store.execution_count(), 1);

        let other: EventResponse = json(
            send(&app, "POST", "/events/member_join/C2", serde_json::json!({})).await,
        )
        .await;
        assert_eq!(other.fired, 0);
    }

    #[tokio::test]
    async fn sub_hourly_cron_is_rejected() {
        let (app, store) = app();
        let workflow = waiting_workflow(&store);
        let response = send(
            &app,
            "POST",
            &format!("/workflows/{}/triggers", workflow.id),
            serde_json::json!({"kind": "cron", "key": "*/10 * * * *"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let message = String::from_utf8(bytes.to_vec()).expect("utf8");
        assert!(message.contains("at most once per hour"), "{message}");
        assert!(store.all_triggers().is_empty());
    }

    #[tokio::test]
    async fn time_is_not_an_event_kind() {
        let (app, _) = app();
        let response = send(&app, "POST", "/events/time/C1", serde_json::json!({})).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn save_then_delete_workflow_removes_triggers() {
        let (app, store) = app();
        let id = WorkflowId::new();
        let uri = format!("/workflows/{id}");
        let body = serde_json::json!({
            "name": "Daily",
            "creator_user_id": "U0",
            "access_token": "xoxb",
            "steps": [{"id": "park", "type_id": "stop"}]
        });

        assert_eq!(send(&app, "PUT", &uri, body.clone()).await.status(), StatusCode::CREATED);
        assert_eq!(send(&app, "PUT", &uri, body).await.status(), StatusCode::NO_CONTENT);
        let trigger = send(
            &app,
            "POST",
            &format!("{uri}/triggers"),
            serde_json::json!({"kind": "cron", "key": "0 9 * * *"}),
        )
        .await;
        assert_eq!(trigger.status(), StatusCode::CREATED);
        assert_eq!(store.all_triggers().len(), 1);

        let deleted = send(&app, "DELETE", &uri, serde_json::json!({})).await;
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
        assert!(store.all_triggers().is_empty());
        assert!(store.get_workflow(id).await.expect("get").is_none());

        let again = send(&app, "DELETE", &uri, serde_json::json!({})).await;
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
    }
}
