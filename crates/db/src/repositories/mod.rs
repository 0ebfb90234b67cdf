use async_trait::async_trait;
use thiserror::Error;

use alur_core::domain::request::{Request, RequestId};
use alur_core::domain::step::{ApprovalStep, StepId};

pub mod request;
pub mod step;

pub use request::SqlRequestRepository;
pub use step::SqlStepRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;
    async fn save(&self, request: Request) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait StepRepository: Send + Sync {
    async fn find_by_id(&self, id: &StepId) -> Result<Option<ApprovalStep>, RepositoryError>;

    /// Steps of one resubmission round, ordered by sequence.
    async fn list_for_round(
        &self,
        request_id: &RequestId,
        round: u32,
    ) -> Result<Vec<ApprovalStep>, RepositoryError>;

    /// Full decision history across all rounds, ordered by (round, sequence).
    async fn list_all(&self, request_id: &RequestId) -> Result<Vec<ApprovalStep>, RepositoryError>;

    async fn save(&self, step: ApprovalStep) -> Result<(), RepositoryError>;
}
