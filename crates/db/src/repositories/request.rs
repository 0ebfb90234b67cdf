use chrono::{DateTime, Utc};
use sqlx::Row;

use alur_core::domain::request::{Request, RequestId, RequestStatus, RequestType};

use super::{RepositoryError, RequestRepository};
use crate::DbPool;

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<Request, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let subject_id: String =
        row.try_get("subject_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_type_str: String =
        row.try_get("request_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let round: i64 = row.try_get("round").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let version: i64 =
        row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let payload_str: String =
        row.try_get("payload").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let final_note: Option<String> =
        row.try_get("final_note").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let document_ref: Option<String> =
        row.try_get("document_ref").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let submitted_at_str: String =
        row.try_get("submitted_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let request_type: RequestType = request_type_str
        .parse()
        .map_err(|e: String| RepositoryError::Decode(e))?;
    let status = RequestStatus::decode(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_str}`")))?;
    let payload = serde_json::from_str(&payload_str)
        .map_err(|e| RepositoryError::Decode(format!("payload is not valid JSON: {e}")))?;
    let submitted_at = parse_timestamp(&submitted_at_str)?;
    let updated_at = parse_timestamp(&updated_at_str)?;

    Ok(Request {
        id: RequestId(id),
        subject_id,
        request_type,
        status,
        round: round as u32,
        version,
        payload,
        final_note,
        document_ref,
        submitted_at,
        updated_at,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("bad timestamp `{value}`: {e}")))
}

pub(crate) async fn fetch_request<'e, E>(
    executor: E,
    id: &RequestId,
) -> Result<Option<Request>, RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        "SELECT id, subject_id, request_type, status, round, version, payload,
                final_note, document_ref, submitted_at, updated_at
         FROM request WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(executor)
    .await?;

    match row {
        Some(ref r) => Ok(Some(row_to_request(r)?)),
        None => Ok(None),
    }
}

pub(crate) async fn insert_request<'e, E>(
    executor: E,
    request: &Request,
) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO request (id, subject_id, request_type, status, round, version, payload,
                              final_note, document_ref, submitted_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&request.id.0)
    .bind(&request.subject_id)
    .bind(request.request_type.as_str())
    .bind(request.status.encode())
    .bind(request.round as i64)
    .bind(request.version)
    .bind(request.payload.to_string())
    .bind(&request.final_note)
    .bind(&request.document_ref)
    .bind(request.submitted_at.to_rfc3339())
    .bind(request.updated_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

/// Optimistic-lock update. Writes the new state only if the stored row still
/// carries `expected_version`; returns whether a row was updated.
pub(crate) async fn update_request_versioned<'e, E>(
    executor: E,
    request: &Request,
    expected_version: i64,
) -> Result<bool, RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        "UPDATE request
         SET status = ?, round = ?, version = ?, payload = ?,
             final_note = ?, document_ref = ?, updated_at = ?
         WHERE id = ? AND version = ?",
    )
    .bind(request.status.encode())
    .bind(request.round as i64)
    .bind(request.version)
    .bind(request.payload.to_string())
    .bind(&request.final_note)
    .bind(&request.document_ref)
    .bind(request.updated_at.to_rfc3339())
    .bind(&request.id.0)
    .bind(expected_version)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        fetch_request(&self.pool, id).await
    }

    async fn save(&self, request: Request) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO request (id, subject_id, request_type, status, round, version, payload,
                                  final_note, document_ref, submitted_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 round = excluded.round,
                 version = excluded.version,
                 payload = excluded.payload,
                 final_note = excluded.final_note,
                 document_ref = excluded.document_ref,
                 updated_at = excluded.updated_at",
        )
        .bind(&request.id.0)
        .bind(&request.subject_id)
        .bind(request.request_type.as_str())
        .bind(request.status.encode())
        .bind(request.round as i64)
        .bind(request.version)
        .bind(request.payload.to_string())
        .bind(&request.final_note)
        .bind(&request.document_ref)
        .bind(request.submitted_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
