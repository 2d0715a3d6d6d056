//! PostgreSQL run store.
//!
//! Runs live in `orchestration_runs`, steps in `run_steps`. The step table's
//! primary key is `(run_id, step_kind, step_seq)`, so the database itself
//! refuses a second record of the same step, including from another process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::types::{ContentDescriptor, DateKey, OrchestrationRun, RunState};

use super::{RunStore, StoreError};
use crate::step::{StepEvent, StepId, StepKind, StepRecord};

const RUN_COLUMNS: &str = "run_id, date_key, started_at, deadline_at, poll_interval_secs, \
                           state, poll_count, result, delivery_error, finished_at";

#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    run_id: Uuid,
    date_key: String,
    started_at: DateTime<Utc>,
    deadline_at: DateTime<Utc>,
    poll_interval_secs: i64,
    state: String,
    poll_count: i32,
    result: Option<serde_json::Value>,
    delivery_error: Option<String>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<RunRow> for OrchestrationRun {
    type Error = StoreError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let run_id = row.run_id;
        let corrupt = |detail: String| StoreError::Corrupt { run_id, detail };

        let date_key: DateKey = row
            .date_key
            .parse()
            .map_err(|e| corrupt(format!("date_key '{}': {}", row.date_key, e)))?;
        let state: RunState = row.state.parse().map_err(corrupt)?;
        let result: Option<ContentDescriptor> =
            row.result.map(serde_json::from_value).transpose()?;

        Ok(OrchestrationRun {
            run_id,
            date_key,
            started_at: row.started_at,
            deadline_at: row.deadline_at,
            poll_interval_secs: u64::try_from(row.poll_interval_secs)
                .map_err(|_| corrupt(format!("poll_interval_secs {}", row.poll_interval_secs)))?,
            state,
            poll_count: u32::try_from(row.poll_count)
                .map_err(|_| corrupt(format!("poll_count {}", row.poll_count)))?,
            result,
            delivery_error: row.delivery_error,
            finished_at: row.finished_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StepRow {
    step_kind: String,
    step_seq: i32,
    payload: serde_json::Value,
    recorded_at: DateTime<Utc>,
}

fn step_from_row(run_id: Uuid, row: StepRow) -> Result<StepRecord, StoreError> {
    let kind: StepKind = row
        .step_kind
        .parse()
        .map_err(|detail| StoreError::Corrupt { run_id, detail })?;
    let event: StepEvent = serde_json::from_value(row.payload)?;
    if event.kind() != kind {
        return Err(StoreError::Corrupt {
            run_id,
            detail: format!("step {} carries a {} payload", kind, event.kind()),
        });
    }
    let seq = u32::try_from(row.step_seq).map_err(|_| StoreError::Corrupt {
        run_id,
        detail: format!("negative step seq {}", row.step_seq),
    })?;

    Ok(StepRecord {
        seq,
        event,
        recorded_at: row.recorded_at,
    })
}

fn runs_from_rows(rows: Vec<RunRow>) -> Result<Vec<OrchestrationRun>, StoreError> {
    rows.into_iter().map(OrchestrationRun::try_from).collect()
}

/// Run store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn create_run(&self, run: &OrchestrationRun) -> Result<(), StoreError> {
        let result = run.result.as_ref().map(serde_json::to_value).transpose()?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orchestration_runs
                (run_id, date_key, started_at, deadline_at, poll_interval_secs,
                 state, poll_count, result, delivery_error, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (run_id) DO NOTHING
            "#,
        )
        .bind(run.run_id)
        .bind(run.date_key.to_string())
        .bind(run.started_at)
        .bind(run.deadline_at)
        .bind(run.poll_interval_secs as i64)
        .bind(run.state.to_string())
        .bind(run.poll_count as i32)
        .bind(result)
        .bind(&run.delivery_error)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::RunExists(run.run_id));
        }
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<OrchestrationRun>, StoreError> {
        let row: Option<RunRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orchestration_runs WHERE run_id = $1",
            RUN_COLUMNS
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrchestrationRun::try_from).transpose()
    }

    async fn save_run(&self, run: &OrchestrationRun) -> Result<(), StoreError> {
        let result = run.result.as_ref().map(serde_json::to_value).transpose()?;

        // Terminal rows are left alone; a missing row is an error.
        let updated = sqlx::query(
            r#"
            UPDATE orchestration_runs
            SET state = $2, poll_count = $3, result = $4, delivery_error = $5,
                finished_at = $6, updated_at = NOW()
            WHERE run_id = $1 AND state NOT IN ('completed', 'expired')
            "#,
        )
        .bind(run.run_id)
        .bind(run.state.to_string())
        .bind(run.poll_count as i32)
        .bind(result)
        .bind(&run.delivery_error)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: Option<(Uuid,)> =
                sqlx::query_as("SELECT run_id FROM orchestration_runs WHERE run_id = $1")
                    .bind(run.run_id)
                    .fetch_optional(&self.pool)
                    .await?;
            if exists.is_none() {
                return Err(StoreError::RunNotFound(run.run_id));
            }
        }
        Ok(())
    }

    async fn append_step(&self, run_id: Uuid, step: &StepRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_value(&step.event)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO run_steps (run_id, step_kind, step_seq, payload, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (run_id, step_kind, step_seq) DO NOTHING
            "#,
        )
        .bind(run_id)
        .bind(step.event.kind().as_str())
        .bind(step.seq as i32)
        .bind(payload)
        .bind(step.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                StoreError::RunNotFound(run_id)
            }
            other => StoreError::Database(other),
        })?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::DuplicateStep {
                run_id,
                step: StepId::new(step.event.kind(), step.seq),
            });
        }
        Ok(())
    }

    async fn load_steps(&self, run_id: Uuid) -> Result<Vec<StepRecord>, StoreError> {
        let rows: Vec<StepRow> = sqlx::query_as(
            r#"
            SELECT step_kind, step_seq, payload, recorded_at
            FROM run_steps
            WHERE run_id = $1
            ORDER BY position
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| step_from_row(run_id, row)).collect()
    }

    async fn list_unfinished(&self) -> Result<Vec<OrchestrationRun>, StoreError> {
        let rows: Vec<RunRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orchestration_runs \
             WHERE state IN ('polling', 'delivering') \
             ORDER BY started_at, run_id",
            RUN_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        runs_from_rows(rows)
    }

    async fn list_by_date(&self, date_key: DateKey) -> Result<Vec<OrchestrationRun>, StoreError> {
        let rows: Vec<RunRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orchestration_runs WHERE date_key = $1 ORDER BY started_at, run_id",
            RUN_COLUMNS
        ))
        .bind(date_key.to_string())
        .fetch_all(&self.pool)
        .await?;

        runs_from_rows(rows)
    }
}
