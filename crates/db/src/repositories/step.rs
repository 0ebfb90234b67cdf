use chrono::{DateTime, Utc};
use sqlx::Row;

use alur_core::domain::request::RequestId;
use alur_core::domain::step::{ApprovalStep, ApproverRole, StepId, StepStatus};

use super::{RepositoryError, StepRepository};
use crate::DbPool;

pub struct SqlStepRepository {
    pool: DbPool,
}

impl SqlStepRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const STEP_COLUMNS: &str = "id, request_id, round, sequence, approver_role, status,
                            decided_by, decided_by_name, decided_at, note, created_at";

pub(crate) fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_id: String =
        row.try_get("request_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let round: i64 = row.try_get("round").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sequence: i64 =
        row.try_get("sequence").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approver_role_str: String =
        row.try_get("approver_role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decided_by: Option<String> =
        row.try_get("decided_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decided_by_name: Option<String> =
        row.try_get("decided_by_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decided_at_str: Option<String> =
        row.try_get("decided_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let note: Option<String> =
        row.try_get("note").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let approver_role: ApproverRole =
        approver_role_str.parse().map_err(|e: String| RepositoryError::Decode(e))?;
    let status = StepStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown step status `{status_str}`")))?;
    let decided_at = decided_at_str.map(|s| parse_timestamp(&s)).transpose()?;
    let created_at = parse_timestamp(&created_at_str)?;

    Ok(ApprovalStep {
        id: StepId(id),
        request_id: RequestId(request_id),
        round: round as u32,
        sequence: sequence as u32,
        approver_role,
        status,
        decided_by,
        decided_by_name,
        decided_at,
        note,
        created_at,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("bad timestamp `{value}`: {e}")))
}

pub(crate) async fn fetch_step<'e, E>(
    executor: E,
    id: &StepId,
) -> Result<Option<ApprovalStep>, RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(&format!("SELECT {STEP_COLUMNS} FROM approval_step WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(executor)
        .await?;

    match row {
        Some(ref r) => Ok(Some(row_to_step(r)?)),
        None => Ok(None),
    }
}

pub(crate) async fn fetch_steps_for_round<'e, E>(
    executor: E,
    request_id: &RequestId,
    round: u32,
) -> Result<Vec<ApprovalStep>, RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let rows = sqlx::query(&format!(
        "SELECT {STEP_COLUMNS} FROM approval_step
         WHERE request_id = ? AND round = ?
         ORDER BY sequence ASC"
    ))
    .bind(&request_id.0)
    .bind(round as i64)
    .fetch_all(executor)
    .await?;

    rows.iter().map(row_to_step).collect()
}

pub(crate) async fn insert_step<'e, E>(
    executor: E,
    step: &ApprovalStep,
) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO approval_step (id, request_id, round, sequence, approver_role, status,
                                    decided_by, decided_by_name, decided_at, note, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&step.id.0)
    .bind(&step.request_id.0)
    .bind(step.round as i64)
    .bind(step.sequence as i64)
    .bind(step.approver_role.as_str())
    .bind(step.status.as_str())
    .bind(&step.decided_by)
    .bind(&step.decided_by_name)
    .bind(step.decided_at.map(|dt| dt.to_rfc3339()))
    .bind(&step.note)
    .bind(step.created_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

/// Records a decision on a step that is still pending. The status guard keeps
/// a racing duplicate from overwriting the first recorded decision.
pub(crate) async fn record_step_decision<'e, E>(
    executor: E,
    step: &ApprovalStep,
) -> Result<bool, RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        "UPDATE approval_step
         SET status = ?, decided_by = ?, decided_by_name = ?, decided_at = ?, note = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(step.status.as_str())
    .bind(&step.decided_by)
    .bind(&step.decided_by_name)
    .bind(step.decided_at.map(|dt| dt.to_rfc3339()))
    .bind(&step.note)
    .bind(&step.id.0)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[async_trait::async_trait]
impl StepRepository for SqlStepRepository {
    async fn find_by_id(&self, id: &StepId) -> Result<Option<ApprovalStep>, RepositoryError> {
        fetch_step(&self.pool, id).await
    }

    async fn list_for_round(
        &self,
        request_id: &RequestId,
        round: u32,
    ) -> Result<Vec<ApprovalStep>, RepositoryError> {
        fetch_steps_for_round(&self.pool, request_id, round).await
    }

    async fn list_all(&self, request_id: &RequestId) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM approval_step
             WHERE request_id = ?
             ORDER BY round ASC, sequence ASC"
        ))
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_step).collect()
    }

    async fn save(&self, step: ApprovalStep) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approval_step (id, request_id, round, sequence, approver_role, status,
                                        decided_by, decided_by_name, decided_at, note, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 decided_by = excluded.decided_by,
                 decided_by_name = excluded.decided_by_name,
                 decided_at = excluded.decided_at,
                 note = excluded.note",
        )
        .bind(&step.id.0)
        .bind(&step.request_id.0)
        .bind(step.round as i64)
        .bind(step.sequence as i64)
        .bind(step.approver_role.as_str())
        .bind(step.status.as_str())
        .bind(&step.decided_by)
        .bind(&step.decided_by_name)
        .bind(step.decided_at.map(|dt| dt.to_rfc3339()))
        .bind(&step.note)
        .bind(step.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
