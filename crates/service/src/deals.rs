use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use pestline_core::domain::deal::{Deal, DealId, DealPatch, DealStage, NewDeal, OrgId};
use pestline_core::errors::DomainError;
use pestline_db::repositories::{DealQuery, DealRepository};

use crate::locks::IdLocks;
use crate::ServiceError;

/// Request-scoped orchestration for the deal funnel: every operation loads
/// the current record, runs the pure transition on an in-memory copy, and
/// writes the whole record back under the per-id lock.
pub struct DealPipelineService {
    deals: Arc<dyn DealRepository>,
    locks: IdLocks,
}

impl DealPipelineService {
    pub fn new(deals: Arc<dyn DealRepository>) -> Self {
        Self { deals, locks: IdLocks::new() }
    }

    pub async fn create(&self, input: NewDeal) -> Result<Deal, ServiceError> {
        let deal = Deal::create(input, Utc::now())?;
        self.deals.save(&deal).await?;
        info!(
            event_name = "deal.created",
            deal_id = %deal.id,
            org_id = %deal.org_id,
            stage = %deal.stage,
            "deal created"
        );
        Ok(deal)
    }

    pub async fn get(&self, id: &DealId) -> Result<Deal, ServiceError> {
        self.load(id).await
    }

    pub async fn list(&self, org_id: OrgId, query: &DealQuery) -> Result<Vec<Deal>, ServiceError> {
        Ok(self.deals.list(org_id, query).await?)
    }

    pub async fn update(&self, id: &DealId, patch: DealPatch) -> Result<Deal, ServiceError> {
        let _guard = self.locks.acquire(id.0).await;
        let mut deal = self.load(id).await?;
        deal.apply_patch(patch, Utc::now())?;
        self.deals.save(&deal).await?;
        Ok(deal)
    }

    pub async fn move_to_stage(
        &self,
        id: &DealId,
        new_stage: DealStage,
    ) -> Result<Deal, ServiceError> {
        let _guard = self.locks.acquire(id.0).await;
        let mut deal = self.load(id).await?;
        deal.move_to_stage(new_stage, Utc::now())?;
        self.deals.save(&deal).await?;
        info!(
            event_name = "deal.stage_changed",
            deal_id = %deal.id,
            stage = %deal.stage,
            win_probability = deal.win_probability,
            "deal moved to new stage"
        );
        Ok(deal)
    }

    pub async fn mark_won(
        &self,
        id: &DealId,
        reason: Option<String>,
    ) -> Result<Deal, ServiceError> {
        let _guard = self.locks.acquire(id.0).await;
        let mut deal = self.load(id).await?;
        deal.mark_won(reason, Utc::now());
        self.deals.save(&deal).await?;
        info!(event_name = "deal.won", deal_id = %deal.id, "deal closed as won");
        Ok(deal)
    }

    pub async fn mark_lost(
        &self,
        id: &DealId,
        reason: String,
        competitor: Option<String>,
    ) -> Result<Deal, ServiceError> {
        let _guard = self.locks.acquire(id.0).await;
        let mut deal = self.load(id).await?;
        deal.mark_lost(reason, competitor, Utc::now());
        self.deals.save(&deal).await?;
        info!(event_name = "deal.lost", deal_id = %deal.id, "deal closed as lost");
        Ok(deal)
    }

    pub async fn delete(&self, id: &DealId) -> Result<(), ServiceError> {
        let _guard = self.locks.acquire(id.0).await;
        if !self.deals.soft_delete(id, Utc::now()).await? {
            return Err(DomainError::not_found("deal", id.to_string()).into());
        }
        Ok(())
    }

    async fn load(&self, id: &DealId) -> Result<Deal, ServiceError> {
        self.deals
            .find_by_id(id, false)
            .await?
            .ok_or_else(|| DomainError::not_found("deal", id.to_string()).into())
    }
}
