use std::sync::Arc;

use chrono::Utc;

use pestline_core::analytics::{
    self, DealFilter, ForecastBucket, PipelineSummary, QuoteStatistics, WinRateStats,
};
use pestline_core::domain::deal::OrgId;
use pestline_db::repositories::{DealQuery, DealRepository, QuoteQuery, QuoteRepository};

use crate::ServiceError;

/// Read-only views over an organization's deals and quotes. Loads the
/// org-scoped records once per call and hands them to the pure folds.
pub struct ReportingService {
    deals: Arc<dyn DealRepository>,
    quotes: Arc<dyn QuoteRepository>,
}

impl ReportingService {
    pub fn new(deals: Arc<dyn DealRepository>, quotes: Arc<dyn QuoteRepository>) -> Self {
        Self { deals, quotes }
    }

    pub async fn pipeline_summary(
        &self,
        org_id: OrgId,
        filter: &DealFilter,
    ) -> Result<PipelineSummary, ServiceError> {
        let deals = self.deals.list(org_id, &DealQuery::default()).await?;
        Ok(analytics::pipeline_summary(&deals, filter))
    }

    pub async fn monthly_forecast(
        &self,
        org_id: OrgId,
        filter: &DealFilter,
    ) -> Result<Vec<ForecastBucket>, ServiceError> {
        let deals = self.deals.list(org_id, &DealQuery::default()).await?;
        Ok(analytics::monthly_forecast(&deals, filter))
    }

    pub async fn win_rate(
        &self,
        org_id: OrgId,
        filter: &DealFilter,
    ) -> Result<WinRateStats, ServiceError> {
        let deals = self.deals.list(org_id, &DealQuery::default()).await?;
        Ok(analytics::win_rate_stats(&deals, filter))
    }

    pub async fn quote_statistics(&self, org_id: OrgId) -> Result<QuoteStatistics, ServiceError> {
        let quotes = self.quotes.list(org_id, &QuoteQuery::default()).await?;
        Ok(analytics::quote_statistics(&quotes, Utc::now()))
    }
}
