use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use pestline_core::domain::contact::{Contact, ContactId};
use pestline_core::domain::deal::{Deal, DealId, DealStage, DealStatus, OrgId};
use pestline_core::domain::quote::{Quote, QuoteId, QuoteNumber, QuoteStatus};

pub mod contact;
pub mod deal;
pub mod memory;
pub mod quote;

pub use contact::SqlContactRepository;
pub use deal::SqlDealRepository;
pub use memory::{InMemoryContactRepository, InMemoryDealRepository, InMemoryQuoteRepository};
pub use quote::SqlQuoteRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DealSort {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
    ValueDesc,
}

/// Org-scoped listing filters. `None` means "no constraint".
#[derive(Clone, Debug, Default)]
pub struct DealQuery {
    pub status: Option<DealStatus>,
    pub stage: Option<DealStage>,
    pub include_deleted: bool,
    pub sort: DealSort,
    pub limit: Option<u32>,
    pub offset: u32,
}

#[derive(Clone, Debug, Default)]
pub struct QuoteQuery {
    pub status: Option<QuoteStatus>,
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

#[async_trait]
pub trait DealRepository: Send + Sync {
    /// Soft-deleted records are invisible unless `include_deleted` is set.
    async fn find_by_id(
        &self,
        id: &DealId,
        include_deleted: bool,
    ) -> Result<Option<Deal>, RepositoryError>;

    async fn save(&self, deal: &Deal) -> Result<(), RepositoryError>;

    /// Returns whether a live record was marked deleted.
    async fn soft_delete(&self, id: &DealId, now: DateTime<Utc>) -> Result<bool, RepositoryError>;

    async fn list(&self, org_id: OrgId, query: &DealQuery) -> Result<Vec<Deal>, RepositoryError>;
}

#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &QuoteId,
        include_deleted: bool,
    ) -> Result<Option<Quote>, RepositoryError>;

    async fn save(&self, quote: &Quote) -> Result<(), RepositoryError>;

    async fn soft_delete(&self, id: &QuoteId, now: DateTime<Utc>)
        -> Result<bool, RepositoryError>;

    async fn list(&self, org_id: OrgId, query: &QuoteQuery) -> Result<Vec<Quote>, RepositoryError>;

    /// Every version in a lineage, newest version first.
    async fn find_by_number(
        &self,
        org_id: OrgId,
        number: &QuoteNumber,
    ) -> Result<Vec<Quote>, RepositoryError>;

    /// Live quotes in draft/sent/viewed whose validity window has passed.
    async fn list_expirable(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Quote>, RepositoryError>;
}

#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &ContactId,
        org_id: OrgId,
    ) -> Result<Option<Contact>, RepositoryError>;

    async fn save(&self, contact: &Contact) -> Result<(), RepositoryError>;
}
