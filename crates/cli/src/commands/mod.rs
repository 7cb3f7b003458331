pub mod doctor;
pub mod expire;
pub mod migrate;
pub mod report;
pub mod seed;

use std::sync::Arc;

use anyhow::Context;

use pestline_core::config::AppConfig;
use pestline_db::repositories::{SqlContactRepository, SqlDealRepository, SqlQuoteRepository};
use pestline_db::{connect_with_settings, DbPool};
use pestline_service::{HttpEmailDispatcher, QuoteLifecycleService, ReportingService};

pub(crate) async fn connect(config: &AppConfig) -> anyhow::Result<DbPool> {
    connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .with_context(|| format!("could not connect to {}", config.database.url))
}

pub(crate) fn reporting_service(pool: &DbPool) -> ReportingService {
    ReportingService::new(
        Arc::new(SqlDealRepository::new(pool.clone())),
        Arc::new(SqlQuoteRepository::new(pool.clone())),
    )
}

pub(crate) fn quote_service(
    config: &AppConfig,
    pool: &DbPool,
) -> anyhow::Result<QuoteLifecycleService> {
    let dispatcher = HttpEmailDispatcher::new(&config.notification)
        .context("could not build notification dispatcher")?;
    QuoteLifecycleService::new(
        Arc::new(SqlQuoteRepository::new(pool.clone())),
        Arc::new(SqlContactRepository::new(pool.clone())),
        Arc::new(dispatcher),
    )
    .context("could not build quote service")
}
