//! Trigger record storage.

use crate::error::{backend, invalid_id};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowrun_core::{ExecutionId, TriggerId, WorkflowId};
use flowrun_workflow::{
    NewTrigger, StoreError, Trigger, TriggerFilter, TriggerKind, TriggerStore,
};
use rootcause::prelude::Report;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::str::FromStr;

const SELECT_TRIGGERS: &str = r#"
    SELECT id, kind, val_string, val_number, func, details, workflow_id,
           execution_id, created_at
    FROM triggers
"#;

/// Row type for trigger queries.
#[derive(FromRow)]
struct TriggerRow {
    id: String,
    kind: String,
    val_string: Option<String>,
    val_number: Option<i64>,
    func: String,
    details: Option<String>,
    workflow_id: Option<String>,
    execution_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TriggerRow {
    fn try_into_record(self) -> Result<Trigger, sqlx::Error> {
        let id =
            TriggerId::from_str(&self.id).map_err(|e| invalid_id("trigger", &self.id, e))?;
        let kind = TriggerKind::from_str(&self.kind).map_err(|e| {
            sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            )))
        })?;
        let workflow_id = self
            .workflow_id
            .map(|wid| WorkflowId::from_str(&wid).map_err(|e| invalid_id("workflow", &wid, e)))
            .transpose()?;
        let execution_id = self
            .execution_id
            .map(|eid| {
                ExecutionId::from_str(&eid).map_err(|e| invalid_id("execution", &eid, e))
            })
            .transpose()?;

        Ok(Trigger {
            id,
            kind,
            val_string: self.val_string,
            val_number: self.val_number,
            func: self.func,
            details: self.details,
            workflow_id,
            execution_id,
            created_at: self.created_at,
        })
    }
}

fn into_records(rows: Vec<TriggerRow>) -> flowrun_core::Result<Vec<Trigger>, StoreError> {
    rows.into_iter()
        .map(|r| r.try_into_record().map_err(backend))
        .collect()
}

/// Appends `WHERE` clauses for every set field of `filter`.
fn push_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &TriggerFilter) {
    let mut separator = " WHERE ";
    if let Some(kind) = filter.kind {
        query.push(separator).push("kind = ").push_bind(kind.as_str());
        separator = " AND ";
    }
    if let Some(key) = &filter.val_string {
        query.push(separator).push("val_string = ").push_bind(key.clone());
        separator = " AND ";
    }
    if let Some(before) = filter.val_number_before {
        query.push(separator).push("val_number < ").push_bind(before);
        separator = " AND ";
    }
    if let Some(workflow_id) = filter.workflow_id {
        query
            .push(separator)
            .push("workflow_id = ")
            .push_bind(workflow_id.to_string());
        separator = " AND ";
    }
    if let Some(execution_id) = filter.execution_id {
        query
            .push(separator)
            .push("execution_id = ")
            .push_bind(execution_id.to_string());
    }
}

/// Repository for trigger records.
#[derive(Clone)]
pub struct TriggerRepository {
    pool: PgPool,
}

impl TriggerRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TriggerStore for TriggerRepository {
    async fn insert_trigger(&self, new: NewTrigger) -> Result<Trigger, Report<StoreError>> {
        let trigger = Trigger::from_new(TriggerId::new(), new);
        sqlx::query(
            r#"
            INSERT INTO triggers
                (id, kind, val_string, val_number, func, details, workflow_id,
                 execution_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(trigger.id.to_string())
        .bind(trigger.kind.as_str())
        .bind(&trigger.val_string)
        .bind(trigger.val_number)
        .bind(&trigger.func)
        .bind(&trigger.details)
        .bind(trigger.workflow_id.map(|w| w.to_string()))
        .bind(trigger.execution_id.map(|e| e.to_string()))
        .bind(trigger.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(trigger)
    }

    async fn triggers_by_kind(&self, kind: TriggerKind) -> Result<Vec<Trigger>, Report<StoreError>> {
        self.find_triggers(&TriggerFilter::kind(kind)).await
    }

    async fn triggers_by_kind_and_key(
        &self,
        kind: TriggerKind,
        key: &str,
    ) -> Result<Vec<Trigger>, Report<StoreError>> {
        self.find_triggers(&TriggerFilter::kind(kind).with_val_string(key))
            .await
    }

    async fn find_triggers(
        &self,
        filter: &TriggerFilter,
    ) -> Result<Vec<Trigger>, Report<StoreError>> {
        let mut query = QueryBuilder::<Postgres>::new(SELECT_TRIGGERS);
        push_filter(&mut query, filter);
        query.push(" ORDER BY created_at ASC");

        let rows: Vec<TriggerRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        into_records(rows)
    }

    async fn update_trigger(&self, trigger: &Trigger) -> Result<(), Report<StoreError>> {
        let result = sqlx::query(
            r#"
            UPDATE triggers
            SET kind = $2, val_string = $3, val_number = $4, func = $5, details = $6,
                workflow_id = $7, execution_id = $8
            WHERE id = $1
            "#,
        )
        .bind(trigger.id.to_string())
        .bind(trigger.kind.as_str())
        .bind(&trigger.val_string)
        .bind(trigger.val_number)
        .bind(&trigger.func)
        .bind(&trigger.details)
        .bind(trigger.workflow_id.map(|w| w.to_string()))
        .bind(trigger.execution_id.map(|e| e.to_string()))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "trigger",
                id: trigger.id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn delete_trigger(&self, id: TriggerId) -> Result<(), Report<StoreError>> {
        sqlx::query("DELETE FROM triggers WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn delete_triggers_for_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<u64, Report<StoreError>> {
        let result = sqlx::query("DELETE FROM triggers WHERE execution_id = $1")
            .bind(execution_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }

    async fn delete_triggers_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<u64, Report<StoreError>> {
        let result = sqlx::query("DELETE FROM triggers WHERE workflow_id = $1")
            .bind(workflow_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql(filter: &TriggerFilter) -> String {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM triggers");
        push_filter(&mut query, filter);
        query.sql().to_string()
    }

    #[test]
    fn empty_filter_has_no_where_clause() {
        assert_eq!(sql(&TriggerFilter::default()), "SELECT * FROM triggers");
    }

    #[test]
    fn due_filter_binds_kind_and_time() {
        let sql = sql(&TriggerFilter::due(Utc::now()));
        assert_eq!(
            sql,
            "SELECT * FROM triggers WHERE kind = $1 AND val_number < $2"
        );
    }

    #[test]
    fn key_and_workflow_are_and_joined() {
        let filter = TriggerFilter::kind(TriggerKind::Message)
            .with_val_string("C1")
            .with_workflow(WorkflowId::new());
        assert_eq!(
            sql(&filter),
            "SELECT * FROM triggers WHERE kind = $1 AND val_string = $2 AND workflow_id = $3"
        );
    }

    #[test]
    fn bad_kind_is_a_decode_error() {
        let row = TriggerRow {
            id: TriggerId::new().to_string(),
            kind: "sometimes".to_string(),
            val_string: None,
            val_number: None,
            func: "workflow.start".to_string(),
            details: None,
            workflow_id: None,
            execution_id: None,
            created_at: Utc::now(),
        };
        assert!(matches!(row.try_into_record(), Err(sqlx::Error::Decode(_))));
    }
}
