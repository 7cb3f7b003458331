use uuid::Uuid;

use pestline_core::config::AppConfig;
use pestline_core::domain::deal::OrgId;

use super::{connect, quote_service};

pub async fn run(config: &AppConfig, org: Uuid) -> anyhow::Result<String> {
    let pool = connect(config).await?;
    let service = quote_service(config, &pool)?;
    let expired = service.expire_due_quotes(OrgId(org)).await?;
    Ok(format!("expired {expired} overdue quote(s) for org {org}"))
}
