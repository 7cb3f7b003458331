use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use pestline_core::domain::contact::{Contact, ContactId};
use pestline_core::domain::deal::{Deal, DealId, OrgId};
use pestline_core::domain::quote::{Quote, QuoteId, QuoteNumber, QuoteStatus};

use super::{
    ContactRepository, DealQuery, DealRepository, DealSort, QuoteQuery, QuoteRepository,
    RepositoryError,
};

#[derive(Default)]
pub struct InMemoryDealRepository {
    deals: RwLock<HashMap<Uuid, Deal>>,
}

#[async_trait::async_trait]
impl DealRepository for InMemoryDealRepository {
    async fn find_by_id(
        &self,
        id: &DealId,
        include_deleted: bool,
    ) -> Result<Option<Deal>, RepositoryError> {
        let deals = self.deals.read().await;
        Ok(deals
            .get(&id.0)
            .filter(|deal| include_deleted || !deal.is_deleted())
            .cloned())
    }

    async fn save(&self, deal: &Deal) -> Result<(), RepositoryError> {
        let mut deals = self.deals.write().await;
        deals.insert(deal.id.0, deal.clone());
        Ok(())
    }

    async fn soft_delete(&self, id: &DealId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut deals = self.deals.write().await;
        match deals.get_mut(&id.0) {
            Some(deal) if !deal.is_deleted() => {
                deal.deleted_at = Some(now);
                deal.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self, org_id: OrgId, query: &DealQuery) -> Result<Vec<Deal>, RepositoryError> {
        let deals = self.deals.read().await;
        let mut matched: Vec<Deal> = deals
            .values()
            .filter(|deal| deal.org_id == org_id)
            .filter(|deal| query.include_deleted || !deal.is_deleted())
            .filter(|deal| query.status.map_or(true, |status| deal.status == status))
            .filter(|deal| query.stage.map_or(true, |stage| deal.stage == stage))
            .cloned()
            .collect();

        match query.sort {
            DealSort::CreatedAtDesc => matched.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            DealSort::CreatedAtAsc => matched.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            DealSort::ValueDesc => {
                matched.sort_by(|a, b| b.deal_value_cents.cmp(&a.deal_value_cents))
            }
        }

        let offset = query.offset as usize;
        let matched: Vec<Deal> = matched.into_iter().skip(offset).collect();
        Ok(match query.limit {
            Some(limit) => matched.into_iter().take(limit as usize).collect(),
            None => matched,
        })
    }
}

#[derive(Default)]
pub struct InMemoryQuoteRepository {
    quotes: RwLock<HashMap<Uuid, Quote>>,
}

#[async_trait::async_trait]
impl QuoteRepository for InMemoryQuoteRepository {
    async fn find_by_id(
        &self,
        id: &QuoteId,
        include_deleted: bool,
    ) -> Result<Option<Quote>, RepositoryError> {
        let quotes = self.quotes.read().await;
        Ok(quotes
            .get(&id.0)
            .filter(|quote| include_deleted || !quote.is_deleted())
            .cloned())
    }

    async fn save(&self, quote: &Quote) -> Result<(), RepositoryError> {
        let mut quotes = self.quotes.write().await;
        quotes.insert(quote.id.0, quote.clone());
        Ok(())
    }

    async fn soft_delete(
        &self,
        id: &QuoteId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut quotes = self.quotes.write().await;
        match quotes.get_mut(&id.0) {
            Some(quote) if !quote.is_deleted() => {
                quote.deleted_at = Some(now);
                quote.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self, org_id: OrgId, query: &QuoteQuery) -> Result<Vec<Quote>, RepositoryError> {
        let quotes = self.quotes.read().await;
        let mut matched: Vec<Quote> = quotes
            .values()
            .filter(|quote| quote.org_id == org_id)
            .filter(|quote| query.include_deleted || !quote.is_deleted())
            .filter(|quote| query.status.map_or(true, |status| quote.status == status))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = query.offset as usize;
        let matched: Vec<Quote> = matched.into_iter().skip(offset).collect();
        Ok(match query.limit {
            Some(limit) => matched.into_iter().take(limit as usize).collect(),
            None => matched,
        })
    }

    async fn find_by_number(
        &self,
        org_id: OrgId,
        number: &QuoteNumber,
    ) -> Result<Vec<Quote>, RepositoryError> {
        let quotes = self.quotes.read().await;
        let mut lineage: Vec<Quote> = quotes
            .values()
            .filter(|quote| {
                quote.org_id == org_id && quote.quote_number == *number && !quote.is_deleted()
            })
            .cloned()
            .collect();
        lineage.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(lineage)
    }

    async fn list_expirable(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Quote>, RepositoryError> {
        let quotes = self.quotes.read().await;
        Ok(quotes
            .values()
            .filter(|quote| quote.org_id == org_id && !quote.is_deleted())
            .filter(|quote| {
                matches!(
                    quote.status,
                    QuoteStatus::Draft | QuoteStatus::Sent | QuoteStatus::Viewed
                )
            })
            .filter(|quote| quote.is_past_valid_until(now))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryContactRepository {
    contacts: RwLock<HashMap<Uuid, Contact>>,
}

#[async_trait::async_trait]
impl ContactRepository for InMemoryContactRepository {
    async fn find_by_id(
        &self,
        id: &ContactId,
        org_id: OrgId,
    ) -> Result<Option<Contact>, RepositoryError> {
        let contacts = self.contacts.read().await;
        Ok(contacts.get(&id.0).filter(|contact| contact.org_id == org_id).cloned())
    }

    async fn save(&self, contact: &Contact) -> Result<(), RepositoryError> {
        let mut contacts = self.contacts.write().await;
        contacts.insert(contact.id.0, contact.clone());
        Ok(())
    }
}
