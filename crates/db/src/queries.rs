use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Row};

use alur_core::domain::request::{Request, RequestId, RequestStatus, RequestType};
use alur_core::domain::step::ApprovalStep;

use crate::repositories::request::row_to_request;
use crate::repositories::step::row_to_step;
use crate::repositories::RepositoryError;
use crate::DbPool;

/// Read-side filters for the request list. All fields are conjunctive.
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    pub status: Option<RequestStatus>,
    pub subject_id: Option<String>,
    pub request_type: Option<RequestType>,
    pub submitted_from: Option<DateTime<Utc>>,
    pub submitted_to: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { limit: 50, offset: 0 }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct RequestSummary {
    pub id: RequestId,
    pub subject_id: String,
    pub request_type: RequestType,
    pub status: String,
    pub round: u32,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One request with its full decision history, every round included.
#[derive(Clone, Debug, Serialize)]
pub struct RequestDetail {
    pub request: Request,
    pub steps: Vec<ApprovalStep>,
}

pub struct WorkflowQueries {
    pool: DbPool,
}

impl WorkflowQueries {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get_request(
        &self,
        id: &RequestId,
    ) -> Result<Option<RequestDetail>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, subject_id, request_type, status, round, version, payload,
                    final_note, document_ref, submitted_at, updated_at
             FROM request WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let request = match row {
            Some(ref r) => row_to_request(r)?,
            None => return Ok(None),
        };

        let steps = sqlx::query(
            "SELECT id, request_id, round, sequence, approver_role, status,
                    decided_by, decided_by_name, decided_at, note, created_at
             FROM approval_step
             WHERE request_id = ?
             ORDER BY round ASC, sequence ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_step)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(RequestDetail { request, steps }))
    }

    pub async fn list_requests(
        &self,
        filter: &ListFilter,
        page: Page,
    ) -> Result<PageResult<RequestSummary>, RepositoryError> {
        let total = {
            let mut builder = QueryBuilder::new("SELECT COUNT(*) AS count FROM request");
            push_filter(&mut builder, filter);
            builder
                .build()
                .fetch_one(&self.pool)
                .await?
                .get::<i64, _>("count")
        };

        let mut builder = QueryBuilder::new(
            "SELECT id, subject_id, request_type, status, round, submitted_at, updated_at
             FROM request",
        );
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY submitted_at DESC, id ASC");
        builder.push(" LIMIT ").push_bind(page.limit.min(500) as i64);
        builder.push(" OFFSET ").push_bind(page.offset as i64);

        let items = builder
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_summary)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PageResult { items, total, limit: page.limit.min(500), offset: page.offset })
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, sqlx::Sqlite>, filter: &ListFilter) {
    builder.push(" WHERE 1=1");

    if let Some(ref status) = filter.status {
        builder.push(" AND status = ").push_bind(status.encode());
    }
    if let Some(ref subject_id) = filter.subject_id {
        builder.push(" AND subject_id = ").push_bind(subject_id.clone());
    }
    if let Some(request_type) = filter.request_type {
        builder.push(" AND request_type = ").push_bind(request_type.as_str());
    }
    if let Some(from) = filter.submitted_from {
        builder.push(" AND submitted_at >= ").push_bind(from.to_rfc3339());
    }
    if let Some(to) = filter.submitted_to {
        builder.push(" AND submitted_at <= ").push_bind(to.to_rfc3339());
    }
}

fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> Result<RequestSummary, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let subject_id: String =
        row.try_get("subject_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_type_str: String =
        row.try_get("request_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let round: i64 = row.try_get("round").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let submitted_at_str: String =
        row.try_get("submitted_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let request_type: RequestType =
        request_type_str.parse().map_err(|e: String| RepositoryError::Decode(e))?;
    let submitted_at = DateTime::parse_from_rfc3339(&submitted_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(RequestSummary {
        id: RequestId(id),
        subject_id,
        request_type,
        status,
        round: round as u32,
        submitted_at,
        updated_at,
    })
}
