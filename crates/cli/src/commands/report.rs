use clap::Subcommand;
use uuid::Uuid;

use pestline_core::analytics::DealFilter;
use pestline_core::config::AppConfig;
use pestline_core::domain::deal::OrgId;

use super::{connect, reporting_service};

#[derive(Debug, Subcommand)]
pub enum ReportView {
    #[command(about = "Open deals grouped by funnel stage with value totals")]
    Pipeline {
        #[arg(long)]
        org: Uuid,
    },
    #[command(about = "Open deals grouped by expected close month")]
    Forecast {
        #[arg(long)]
        org: Uuid,
    },
    #[command(about = "Win/loss conversion and deal sizing")]
    WinRate {
        #[arg(long)]
        org: Uuid,
    },
    #[command(about = "Quote counts and totals by status")]
    Quotes {
        #[arg(long)]
        org: Uuid,
    },
}

pub async fn run(config: &AppConfig, view: ReportView) -> anyhow::Result<String> {
    let pool = connect(config).await?;
    let reporting = reporting_service(&pool);
    let filter = DealFilter::default();

    let rendered = match view {
        ReportView::Pipeline { org } => {
            let summary = reporting.pipeline_summary(OrgId(org), &filter).await?;
            serde_json::to_string_pretty(&summary)?
        }
        ReportView::Forecast { org } => {
            let buckets = reporting.monthly_forecast(OrgId(org), &filter).await?;
            serde_json::to_string_pretty(&buckets)?
        }
        ReportView::WinRate { org } => {
            let stats = reporting.win_rate(OrgId(org), &filter).await?;
            serde_json::to_string_pretty(&stats)?
        }
        ReportView::Quotes { org } => {
            let stats = reporting.quote_statistics(OrgId(org)).await?;
            serde_json::to_string_pretty(&stats)?
        }
    };
    Ok(rendered)
}
