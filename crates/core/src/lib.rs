pub mod audit;
pub mod chain;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod notify;
pub mod org;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use chain::{ChainBuilder, ChainPolicy, ChainStep};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::principal::Principal;
pub use domain::request::{Request, RequestId, RequestStatus, RequestType};
pub use domain::step::{ApprovalStep, ApproverRole, DecisionOutcome, StepId, StepStatus};
pub use engine::{Decision, DecisionApplied, TransitionOutcome, WorkflowEngine};
pub use errors::{ApplicationError, InterfaceError, WorkflowError};
pub use notify::{InMemoryNotifier, NoopNotifier, NotificationDispatch, TransitionNotice};
pub use org::{InMemoryOrgResolver, OrgResolver};
