use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use alur_core::chain::ChainPolicy;
use alur_core::config::{AppConfig, ConfigError, LoadOptions};
use alur_core::domain::principal::Principal;
use alur_core::domain::step::ApproverRole;
use alur_core::notify::{NoopNotifier, NotificationDispatch};
use alur_core::org::{InMemoryOrgResolver, OrgResolver};
use alur_db::{connect_from_config, migrations, DbPool, WorkflowQueries, WorkflowService};

use crate::notify_http::WebhookNotifier;
use crate::observe::TracingAuditSink;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<WorkflowService>,
    pub queries: Arc<WorkflowQueries>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        request_id = "unknown",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        request_id = "unknown",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        request_id = "unknown",
        "database migrations applied"
    );

    let resolver = org_resolver_from_config(&config)?;
    let notifier: Arc<dyn NotificationDispatch> = match WebhookNotifier::from_config(&config.notifier)
    {
        Some(webhook) => Arc::new(webhook),
        None => Arc::new(NoopNotifier),
    };

    let service = Arc::new(WorkflowService::new(
        db_pool.clone(),
        ChainPolicy::default(),
        resolver,
        Arc::new(TracingAuditSink),
        notifier,
    ));
    let queries = Arc::new(WorkflowQueries::new(db_pool.clone()));

    Ok(Application { config, db_pool, service, queries })
}

/// Seats come from `[org]` config in single-tenant deployments; a live
/// org-chart service would plug in behind the same trait.
fn org_resolver_from_config(config: &AppConfig) -> Result<Arc<dyn OrgResolver>, BootstrapError> {
    let mut resolver = InMemoryOrgResolver::default();
    for seat in &config.org.seats {
        let role: ApproverRole = seat
            .role
            .parse()
            .map_err(|message: String| ConfigError::Validation(message))?;
        resolver = resolver
            .with_seat(role, Principal::new(seat.id.clone(), seat.name.clone()).with_role(role));
    }
    Ok(Arc::new(resolver))
}
