use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use pestline_core::domain::deal::OrgId;
use pestline_core::domain::quote::{NewQuote, Quote, QuoteId, QuotePatch, QuoteStatus, Signer};
use pestline_core::errors::DomainError;
use pestline_db::repositories::{ContactRepository, QuoteQuery, QuoteRepository};

use crate::dispatch::{QuoteDispatcher, QuoteRenderer};
use crate::locks::IdLocks;
use crate::ServiceError;

pub struct QuoteLifecycleService {
    quotes: Arc<dyn QuoteRepository>,
    contacts: Arc<dyn ContactRepository>,
    dispatcher: Arc<dyn QuoteDispatcher>,
    renderer: QuoteRenderer,
    locks: IdLocks,
}

impl QuoteLifecycleService {
    pub fn new(
        quotes: Arc<dyn QuoteRepository>,
        contacts: Arc<dyn ContactRepository>,
        dispatcher: Arc<dyn QuoteDispatcher>,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            quotes,
            contacts,
            dispatcher,
            renderer: QuoteRenderer::new()?,
            locks: IdLocks::new(),
        })
    }

    pub async fn create(&self, input: NewQuote) -> Result<Quote, ServiceError> {
        if let (Some(org_id), Some(contact_id)) = (input.org_id, input.contact_id) {
            if self.contacts.find_by_id(&contact_id, org_id).await?.is_none() {
                return Err(DomainError::validation(
                    "contact does not belong to the organization",
                )
                .into());
            }
        }
        let quote = Quote::create(input, Utc::now())?;
        self.quotes.save(&quote).await?;
        info!(
            event_name = "quote.created",
            quote_id = %quote.id,
            quote_number = %quote.quote_number,
            org_id = %quote.org_id,
            "quote created"
        );
        Ok(quote)
    }

    pub async fn get(&self, id: &QuoteId) -> Result<Quote, ServiceError> {
        self.load(id).await
    }

    pub async fn list(
        &self,
        org_id: OrgId,
        query: &QuoteQuery,
    ) -> Result<Vec<Quote>, ServiceError> {
        Ok(self.quotes.list(org_id, query).await?)
    }

    /// Draft edits and explicit in-place updates mutate the record; a
    /// post-send edit with `create_new_version` spawns the successor and
    /// flips the current record to `revised`. The returned quote is the
    /// one the caller should keep working with.
    pub async fn update(
        &self,
        id: &QuoteId,
        patch: QuotePatch,
        create_new_version: bool,
    ) -> Result<Quote, ServiceError> {
        let _guard = self.locks.acquire(id.0).await;
        let mut quote = self.load(id).await?;
        let now = Utc::now();

        if !create_new_version || quote.status == QuoteStatus::Draft {
            quote.apply_patch(patch, now)?;
            self.quotes.save(&quote).await?;
            return Ok(quote);
        }

        let next = quote.revise(patch, now)?;
        self.quotes.save(&quote).await?;
        self.quotes.save(&next).await?;
        info!(
            event_name = "quote.revised",
            quote_id = %quote.id,
            successor_id = %next.id,
            version = next.version,
            "quote superseded by new version"
        );
        Ok(next)
    }

    pub async fn record_view(&self, id: &QuoteId) -> Result<Quote, ServiceError> {
        let _guard = self.locks.acquire(id.0).await;
        let mut quote = self.load(id).await?;
        quote.record_view(Utc::now());
        self.quotes.save(&quote).await?;
        Ok(quote)
    }

    /// Expiry is evaluated lazily here: an overdue quote is persisted as
    /// `expired` first, and the accept call then fails. This is the one
    /// error path with a documented side effect.
    pub async fn accept(&self, id: &QuoteId, signer: Signer) -> Result<Quote, ServiceError> {
        let _guard = self.locks.acquire(id.0).await;
        let mut quote = self.load(id).await?;
        let now = Utc::now();

        if !quote.status.is_terminal_for_editing() && quote.is_past_valid_until(now) {
            quote.expire(now);
            self.quotes.save(&quote).await?;
            warn!(
                event_name = "quote.expired_on_accept",
                quote_id = %quote.id,
                "accept attempted on overdue quote; record expired"
            );
            return Err(
                DomainError::invalid_operation("quote validity window has passed").into()
            );
        }

        quote.accept(signer, now)?;
        self.quotes.save(&quote).await?;
        info!(event_name = "quote.accepted", quote_id = %quote.id, "quote accepted");
        Ok(quote)
    }

    pub async fn reject(
        &self,
        id: &QuoteId,
        reason: Option<String>,
    ) -> Result<Quote, ServiceError> {
        let _guard = self.locks.acquire(id.0).await;
        let mut quote = self.load(id).await?;
        quote.reject(reason, Utc::now())?;
        self.quotes.save(&quote).await?;
        info!(event_name = "quote.rejected", quote_id = %quote.id, "quote rejected");
        Ok(quote)
    }

    /// Render and deliver the quote. The status flip to `sent` happens
    /// only after the dispatcher reports success, so a delivery failure
    /// leaves the record untouched.
    pub async fn send(
        &self,
        id: &QuoteId,
        recipient: &str,
        cc: &[String],
    ) -> Result<Quote, ServiceError> {
        let _guard = self.locks.acquire(id.0).await;
        let mut quote = self.load(id).await?;

        let rendered = self.renderer.render(&quote)?;
        self.dispatcher.dispatch(&rendered, recipient, cc).await?;

        quote.mark_sent(recipient, Utc::now());
        self.quotes.save(&quote).await?;
        info!(
            event_name = "quote.sent",
            quote_id = %quote.id,
            recipient = recipient,
            "quote dispatched"
        );
        Ok(quote)
    }

    pub async fn clone_quote(&self, id: &QuoteId) -> Result<Quote, ServiceError> {
        let quote = self.load(id).await?;
        let copy = quote.clone_lineage(Utc::now());
        self.quotes.save(&copy).await?;
        Ok(copy)
    }

    /// Every version sharing this quote's number, newest first.
    pub async fn version_history(&self, id: &QuoteId) -> Result<Vec<Quote>, ServiceError> {
        let quote = self.load(id).await?;
        Ok(self.quotes.find_by_number(quote.org_id, &quote.quote_number).await?)
    }

    /// Maintenance sweep: expire every live draft/sent/viewed quote whose
    /// validity window has passed. Idempotent and safe to re-run.
    pub async fn expire_due_quotes(&self, org_id: OrgId) -> Result<usize, ServiceError> {
        let now = Utc::now();
        let due = self.quotes.list_expirable(org_id, now).await?;
        let mut expired = 0;
        for candidate in due {
            let _guard = self.locks.acquire(candidate.id.0).await;
            // The scan ran outside the lock; re-read each record so a
            // write that landed in between is not overwritten.
            let Some(mut quote) = self.quotes.find_by_id(&candidate.id, false).await? else {
                continue;
            };
            let still_live = matches!(
                quote.status,
                QuoteStatus::Draft | QuoteStatus::Sent | QuoteStatus::Viewed
            );
            if !still_live || !quote.is_past_valid_until(now) {
                continue;
            }
            quote.expire(now);
            self.quotes.save(&quote).await?;
            expired += 1;
        }
        if expired > 0 {
            info!(
                event_name = "quote.batch_expired",
                org_id = %org_id,
                count = expired,
                "expired overdue quotes"
            );
        }
        Ok(expired)
    }

    pub async fn delete(&self, id: &QuoteId) -> Result<(), ServiceError> {
        let _guard = self.locks.acquire(id.0).await;
        if !self.quotes.soft_delete(id, Utc::now()).await? {
            return Err(DomainError::not_found("quote", id.to_string()).into());
        }
        Ok(())
    }

    async fn load(&self, id: &QuoteId) -> Result<Quote, ServiceError> {
        self.quotes
            .find_by_id(id, false)
            .await?
            .ok_or_else(|| DomainError::not_found("quote", id.to_string()).into())
    }
}
