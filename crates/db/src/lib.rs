pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod queries;
pub mod repositories;
pub mod workflow;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, SeedResult, VerificationResult};
pub use queries::{ListFilter, Page, PageResult, RequestDetail, RequestSummary, WorkflowQueries};
pub use workflow::{ServiceError, SubmitIntent, WorkflowService};
