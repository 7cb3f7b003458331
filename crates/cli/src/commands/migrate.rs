use anyhow::Context;

use pestline_core::config::AppConfig;
use pestline_db::migrations;

use super::connect;

pub async fn run(config: &AppConfig) -> anyhow::Result<String> {
    let pool = connect(config).await?;
    migrations::run_pending(&pool).await.context("migration failed")?;
    Ok(format!("migrations applied to {}", config.database.url))
}
