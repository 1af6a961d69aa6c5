//! Execution row storage.
//!
//! The step snapshot and [`ExecutionState`] are JSON text columns; they are
//! decoded into typed values here and nowhere else.

use crate::error::{backend, decode, encode, invalid_id};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowrun_core::{ExecutionId, WorkflowId};
use flowrun_workflow::{
    ExecutionState, ExecutionStore, NewExecution, Step, StoreError, WorkflowExecution,
};
use rootcause::prelude::Report;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for execution queries.
#[derive(FromRow)]
struct ExecutionRow {
    id: String,
    workflow_id: String,
    trigger_user_id: String,
    steps: String,
    step_index: i32,
    state: String,
    correlation_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ExecutionRow {
    fn try_into_record(self) -> flowrun_core::Result<WorkflowExecution, StoreError> {
        let id = ExecutionId::from_str(&self.id)
            .map_err(|e| backend(invalid_id("execution", &self.id, e)))?;
        let workflow_id = WorkflowId::from_str(&self.workflow_id)
            .map_err(|e| backend(invalid_id("workflow", &self.workflow_id, e)))?;
        let steps: Vec<Step> =
            serde_json::from_str(&self.steps).map_err(|e| decode("execution steps", &e))?;
        let state: ExecutionState =
            serde_json::from_str(&self.state).map_err(|e| decode("execution state", &e))?;
        let step_index = usize::try_from(self.step_index).map_err(|e| {
            Report::from(StoreError::Decode {
                entity: "execution step index",
                reason: e.to_string(),
            })
        })?;

        Ok(WorkflowExecution {
            id,
            workflow_id,
            trigger_user_id: self.trigger_user_id,
            steps,
            step_index,
            state,
            correlation_id: self.correlation_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn index_column(index: usize) -> flowrun_core::Result<i32, StoreError> {
    i32::try_from(index).map_err(|e| {
        StoreError::Backend {
            reason: format!("step index {index} out of range: {e}"),
        }
        .into()
    })
}

/// Repository for workflow executions.
#[derive(Clone)]
pub struct ExecutionRepository {
    pool: PgPool,
}

impl ExecutionRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionStore for ExecutionRepository {
    async fn insert_execution(
        &self,
        new: NewExecution,
    ) -> Result<WorkflowExecution, Report<StoreError>> {
        let execution = WorkflowExecution::from_new(ExecutionId::new(), new);
        let steps =
            serde_json::to_string(&execution.steps).map_err(|e| encode("execution steps", &e))?;
        let state =
            serde_json::to_string(&execution.state).map_err(|e| encode("execution state", &e))?;

        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_id, trigger_user_id, steps, step_index, state,
                 correlation_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(&execution.trigger_user_id)
        .bind(steps)
        .bind(index_column(execution.step_index)?)
        .bind(state)
        .bind(&execution.correlation_id)
        .bind(execution.created_at)
        .bind(execution.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(execution)
    }

    async fn get_execution(
        &self,
        id: ExecutionId,
    ) -> Result<Option<WorkflowExecution>, Report<StoreError>> {
        let row: Option<ExecutionRow> = sqlx::query_as(
            r#"
            SELECT id, workflow_id, trigger_user_id, steps, step_index, state,
                   correlation_id, created_at, updated_at
            FROM workflow_executions
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(ExecutionRow::try_into_record).transpose()
    }

    async fn update_at_step(
        &self,
        execution: &WorkflowExecution,
        expected_step_index: usize,
    ) -> Result<bool, Report<StoreError>> {
        let state =
            serde_json::to_string(&execution.state).map_err(|e| encode("execution state", &e))?;
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET step_index = $2, state = $3, correlation_id = $4, updated_at = $5
            WHERE id = $1 AND step_index = $6
            "#,
        )
        .bind(execution.id.to_string())
        .bind(index_column(execution.step_index)?)
        .bind(state)
        .bind(&execution.correlation_id)
        .bind(execution.updated_at)
        .bind(index_column(expected_step_index)?)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_execution(&self, id: ExecutionId) -> Result<(), Report<StoreError>> {
        sqlx::query("DELETE FROM workflow_executions WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
