//! Workflow definition storage.

use crate::error::{backend, decode, encode, invalid_id};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowrun_core::WorkflowId;
use flowrun_workflow::{AccessToken, Step, StoreError, Workflow, WorkflowStore};
use rootcause::prelude::Report;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for workflow queries.
#[derive(FromRow)]
struct WorkflowRow {
    id: String,
    name: String,
    creator_user_id: String,
    access_token: Option<String>,
    steps: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkflowRow {
    fn try_into_record(self) -> flowrun_core::Result<Workflow, StoreError> {
        let id = WorkflowId::from_str(&self.id)
            .map_err(|e| backend(invalid_id("workflow", &self.id, e)))?;
        let steps: Vec<Step> =
            serde_json::from_str(&self.steps).map_err(|e| decode("workflow steps", &e))?;

        Ok(Workflow {
            id,
            name: self.name,
            creator_user_id: self.creator_user_id,
            access_token: self.access_token.map(AccessToken::new),
            steps,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Repository for workflow definitions.
#[derive(Clone)]
pub struct WorkflowRepository {
    pool: PgPool,
}

impl WorkflowRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for WorkflowRepository {
    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, Report<StoreError>> {
        let row: Option<WorkflowRow> = sqlx::query_as(
            r#"
            SELECT id, name, creator_user_id, access_token, steps, created_at, updated_at
            FROM workflows
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(WorkflowRow::try_into_record).transpose()
    }

    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), Report<StoreError>> {
        let steps =
            serde_json::to_string(&workflow.steps).map_err(|e| encode("workflow steps", &e))?;
        sqlx::query(
            r#"
            INSERT INTO workflows
                (id, name, creator_user_id, access_token, steps, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                creator_user_id = EXCLUDED.creator_user_id,
                access_token = EXCLUDED.access_token,
                steps = EXCLUDED.steps,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(&workflow.creator_user_id)
        .bind(workflow.access_token.as_ref().map(AccessToken::expose))
        .bind(steps)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn delete_workflow(&self, id: WorkflowId) -> Result<bool, Report<StoreError>> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }
}
