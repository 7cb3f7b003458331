use pestline_core::config::AppConfig;
use pestline_db::connection;

use super::connect;

pub async fn run(config: &AppConfig) -> anyhow::Result<String> {
    let mut lines = Vec::new();
    lines.push(format!("config: ok (database {})", config.database.url));

    match connect(config).await {
        Ok(pool) => match connection::ping(&pool).await {
            Ok(()) => lines.push("database: reachable".to_string()),
            Err(error) => lines.push(format!("database: UNREACHABLE ({error})")),
        },
        Err(error) => lines.push(format!("database: UNREACHABLE ({error:#})")),
    }

    lines.push(format!(
        "notification: {} (api key {})",
        config.notification.api_url,
        if config.notification.api_key.is_some() { "set" } else { "not set" }
    ));

    Ok(lines.join("\n"))
}
