use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use pestline_core::domain::contact::{Contact, ContactId};
use pestline_core::domain::deal::OrgId;
use pestline_core::domain::quote::{
    NewQuote, Quote, QuoteId, QuoteLineItem, QuoteNumber, QuotePatch, QuoteStatus, Signer,
};
use pestline_core::errors::DomainError;
use pestline_db::repositories::{
    ContactRepository, InMemoryContactRepository, InMemoryQuoteRepository, QuoteQuery,
    QuoteRepository, RepositoryError,
};
use pestline_service::{
    DispatchError, QuoteDispatcher, QuoteLifecycleService, RenderedQuote, ServiceError,
};

#[derive(Default)]
struct RecordingDispatcher {
    deliveries: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl QuoteDispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        document: &RenderedQuote,
        recipient: &str,
        _cc: &[String],
    ) -> Result<(), DispatchError> {
        let mut deliveries = self.deliveries.lock().await;
        deliveries.push((recipient.to_string(), document.subject.clone()));
        Ok(())
    }
}

/// Flips every scanned quote to `accepted` after the expirable scan
/// returns, so the sweep sees a stale copy of a record that was written
/// in the meantime.
struct AcceptDuringScanRepository {
    inner: InMemoryQuoteRepository,
}

#[async_trait]
impl QuoteRepository for AcceptDuringScanRepository {
    async fn find_by_id(
        &self,
        id: &QuoteId,
        include_deleted: bool,
    ) -> Result<Option<Quote>, RepositoryError> {
        self.inner.find_by_id(id, include_deleted).await
    }

    async fn save(&self, quote: &Quote) -> Result<(), RepositoryError> {
        self.inner.save(quote).await
    }

    async fn soft_delete(
        &self,
        id: &QuoteId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.inner.soft_delete(id, now).await
    }

    async fn list(
        &self,
        org_id: OrgId,
        query: &QuoteQuery,
    ) -> Result<Vec<Quote>, RepositoryError> {
        self.inner.list(org_id, query).await
    }

    async fn find_by_number(
        &self,
        org_id: OrgId,
        number: &QuoteNumber,
    ) -> Result<Vec<Quote>, RepositoryError> {
        self.inner.find_by_number(org_id, number).await
    }

    async fn list_expirable(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Quote>, RepositoryError> {
        let due = self.inner.list_expirable(org_id, now).await?;
        for stale in &due {
            if let Some(mut fresh) = self.inner.find_by_id(&stale.id, false).await? {
                fresh.status = QuoteStatus::Accepted;
                fresh.status_changed_at = now;
                self.inner.save(&fresh).await?;
            }
        }
        Ok(due)
    }
}

struct FailingDispatcher;

#[async_trait]
impl QuoteDispatcher for FailingDispatcher {
    async fn dispatch(
        &self,
        _document: &RenderedQuote,
        _recipient: &str,
        _cc: &[String],
    ) -> Result<(), DispatchError> {
        Err(DispatchError::Transport("connection refused".to_string()))
    }
}

struct Fixture {
    service: QuoteLifecycleService,
    quotes: Arc<InMemoryQuoteRepository>,
    dispatcher: Arc<RecordingDispatcher>,
    org_id: OrgId,
    contact_id: ContactId,
}

async fn fixture() -> Fixture {
    let quotes = Arc::new(InMemoryQuoteRepository::default());
    let contacts = Arc::new(InMemoryContactRepository::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());

    let org_id = OrgId(Uuid::new_v4());
    let contact_id = ContactId(Uuid::new_v4());
    contacts
        .save(&Contact {
            id: contact_id,
            org_id,
            name: "Morgan Diaz".to_string(),
            email: Some("morgan@example.com".to_string()),
        })
        .await
        .expect("seed contact");

    let service = QuoteLifecycleService::new(
        Arc::clone(&quotes) as Arc<dyn QuoteRepository>,
        contacts,
        Arc::clone(&dispatcher) as Arc<dyn QuoteDispatcher>,
    )
    .expect("service");

    Fixture { service, quotes, dispatcher, org_id, contact_id }
}

fn new_quote(org_id: OrgId, contact_id: ContactId) -> NewQuote {
    NewQuote {
        org_id: Some(org_id),
        contact_id: Some(contact_id),
        title: "Seasonal mosquito program".to_string(),
        line_items: vec![QuoteLineItem::new("Monthly barrier spray", 6, Decimal::new(9_500, 2))],
        valid_until: Some(Utc::now() + Duration::days(30)),
        ..NewQuote::default()
    }
}

#[tokio::test]
async fn create_rejects_a_contact_from_another_org() {
    let fx = fixture().await;
    let input = new_quote(fx.org_id, ContactId(Uuid::new_v4()));

    let error = fx.service.create(input).await.expect_err("foreign contact");
    assert!(matches!(error, ServiceError::Domain(DomainError::Validation(_))));
}

#[tokio::test]
async fn send_marks_sent_only_after_dispatch_succeeds() {
    let fx = fixture().await;
    let quote =
        fx.service.create(new_quote(fx.org_id, fx.contact_id)).await.expect("create");

    let sent = fx
        .service
        .send(&quote.id, "morgan@example.com", &[])
        .await
        .expect("send");

    assert_eq!(sent.status, QuoteStatus::Sent);
    assert!(sent.sent_at.is_some());
    assert_eq!(sent.sent_to_email.as_deref(), Some("morgan@example.com"));

    let deliveries = fx.dispatcher.deliveries.lock().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, "morgan@example.com");
}

#[tokio::test]
async fn dispatch_failure_leaves_the_quote_untouched() {
    let quotes = Arc::new(InMemoryQuoteRepository::default());
    let contacts = Arc::new(InMemoryContactRepository::default());
    let org_id = OrgId(Uuid::new_v4());
    let contact_id = ContactId(Uuid::new_v4());
    contacts
        .save(&Contact { id: contact_id, org_id, name: "Lee".to_string(), email: None })
        .await
        .expect("seed contact");

    let service = QuoteLifecycleService::new(
        Arc::clone(&quotes) as Arc<dyn QuoteRepository>,
        contacts,
        Arc::new(FailingDispatcher),
    )
    .expect("service");

    let quote = service.create(new_quote(org_id, contact_id)).await.expect("create");
    let error = service
        .send(&quote.id, "lee@example.com", &[])
        .await
        .expect_err("dispatch failure");
    assert!(matches!(error, ServiceError::Dispatch(_)));

    let stored = quotes.find_by_id(&quote.id, false).await.expect("find").expect("present");
    assert_eq!(stored.status, QuoteStatus::Draft);
    assert!(stored.sent_at.is_none());
}

#[tokio::test]
async fn accepting_an_overdue_quote_persists_expiry_then_fails() {
    let fx = fixture().await;
    let mut input = new_quote(fx.org_id, fx.contact_id);
    input.valid_until = Some(Utc::now() - Duration::days(1));
    let quote = fx.service.create(input).await.expect("create");

    let error = fx
        .service
        .accept(
            &quote.id,
            Signer {
                name: "Morgan Diaz".to_string(),
                email: "morgan@example.com".to_string(),
                signature_data: None,
                origin_address: None,
            },
        )
        .await
        .expect_err("accept overdue");
    assert!(matches!(error, ServiceError::Domain(DomainError::InvalidOperation(_))));

    let stored =
        fx.quotes.find_by_id(&quote.id, false).await.expect("find").expect("present");
    assert_eq!(stored.status, QuoteStatus::Expired);
}

#[tokio::test]
async fn versioning_a_sent_quote_supersedes_the_original() {
    let fx = fixture().await;
    let quote =
        fx.service.create(new_quote(fx.org_id, fx.contact_id)).await.expect("create");
    fx.service.send(&quote.id, "morgan@example.com", &[]).await.expect("send");

    let next = fx
        .service
        .update(
            &quote.id,
            QuotePatch {
                title: Some("Seasonal mosquito program, extended".to_string()),
                ..QuotePatch::default()
            },
            true,
        )
        .await
        .expect("revise");

    assert_eq!(next.version, 2);
    assert_eq!(next.status, QuoteStatus::Draft);
    assert_eq!(next.previous_version_id, Some(quote.id));
    assert!(next.sent_at.is_none());

    let original =
        fx.quotes.find_by_id(&quote.id, false).await.expect("find").expect("present");
    assert_eq!(original.status, QuoteStatus::Revised);

    // History resolves from either end of the chain, newest first.
    for id in [&quote.id, &next.id] {
        let history = fx.service.version_history(id).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, 2);
        assert_eq!(history[1].version, 1);
    }
}

#[tokio::test]
async fn draft_edit_stays_in_place_even_when_versioning_requested() {
    let fx = fixture().await;
    let quote =
        fx.service.create(new_quote(fx.org_id, fx.contact_id)).await.expect("create");

    let updated = fx
        .service
        .update(
            &quote.id,
            QuotePatch { title: Some("Adjusted draft".to_string()), ..QuotePatch::default() },
            true,
        )
        .await
        .expect("draft edit");

    assert_eq!(updated.id, quote.id);
    assert_eq!(updated.version, 1);
    assert_eq!(fx.service.version_history(&quote.id).await.expect("history").len(), 1);
}

#[tokio::test]
async fn repeat_views_count_but_keep_first_viewed_at() {
    let fx = fixture().await;
    let quote =
        fx.service.create(new_quote(fx.org_id, fx.contact_id)).await.expect("create");
    fx.service.send(&quote.id, "morgan@example.com", &[]).await.expect("send");

    let first = fx.service.record_view(&quote.id).await.expect("first view");
    assert_eq!(first.status, QuoteStatus::Viewed);
    let second = fx.service.record_view(&quote.id).await.expect("second view");

    assert_eq!(second.viewed_count, 2);
    assert_eq!(second.viewed_at, first.viewed_at);
}

#[tokio::test]
async fn batch_expiration_sweeps_only_overdue_live_quotes() {
    let fx = fixture().await;

    let mut overdue = new_quote(fx.org_id, fx.contact_id);
    overdue.valid_until = Some(Utc::now() - Duration::days(3));
    let overdue = fx.service.create(overdue).await.expect("create overdue");

    fx.service.create(new_quote(fx.org_id, fx.contact_id)).await.expect("create current");

    let expired = fx.service.expire_due_quotes(fx.org_id).await.expect("sweep");
    assert_eq!(expired, 1);

    let stored =
        fx.quotes.find_by_id(&overdue.id, false).await.expect("find").expect("present");
    assert_eq!(stored.status, QuoteStatus::Expired);

    // Re-running finds nothing left to expire.
    assert_eq!(fx.service.expire_due_quotes(fx.org_id).await.expect("sweep again"), 0);
}

#[tokio::test]
async fn sweep_skips_a_quote_written_after_the_scan() {
    let contacts = Arc::new(InMemoryContactRepository::default());
    let org_id = OrgId(Uuid::new_v4());
    let contact_id = ContactId(Uuid::new_v4());
    contacts
        .save(&Contact { id: contact_id, org_id, name: "Sam".to_string(), email: None })
        .await
        .expect("seed contact");

    let quotes = Arc::new(AcceptDuringScanRepository {
        inner: InMemoryQuoteRepository::default(),
    });
    let service = QuoteLifecycleService::new(
        Arc::clone(&quotes) as Arc<dyn QuoteRepository>,
        contacts,
        Arc::new(RecordingDispatcher::default()),
    )
    .expect("service");

    let mut input = new_quote(org_id, contact_id);
    input.valid_until = Some(Utc::now() - Duration::days(1));
    let quote = service.create(input).await.expect("create");

    // The record was accepted between the scan and the per-id lock; the
    // sweep must re-read it and leave the acceptance in place.
    let expired = service.expire_due_quotes(org_id).await.expect("sweep");
    assert_eq!(expired, 0);

    let stored = quotes.find_by_id(&quote.id, false).await.expect("find").expect("present");
    assert_eq!(stored.status, QuoteStatus::Accepted);
}

#[tokio::test]
async fn repeated_revisions_keep_versions_contiguous_with_one_live_head() {
    let fx = fixture().await;
    let v1 = fx.service.create(new_quote(fx.org_id, fx.contact_id)).await.expect("create");
    fx.service.send(&v1.id, "morgan@example.com", &[]).await.expect("send v1");

    let v2 = fx
        .service
        .update(&v1.id, QuotePatch::default(), true)
        .await
        .expect("revise to v2");
    fx.service.send(&v2.id, "morgan@example.com", &[]).await.expect("send v2");

    let v3 = fx
        .service
        .update(&v2.id, QuotePatch::default(), true)
        .await
        .expect("revise to v3");

    // A superseded record cannot spawn another successor.
    let error = fx
        .service
        .update(&v1.id, QuotePatch::default(), true)
        .await
        .expect_err("revise stale version");
    assert!(matches!(error, ServiceError::Domain(DomainError::InvalidOperation(_))));

    let history = fx.service.version_history(&v3.id).await.expect("history");
    let versions: Vec<u32> = history.iter().map(|q| q.version).collect();
    assert_eq!(versions, vec![3, 2, 1]);

    let live_heads = history
        .iter()
        .filter(|q| q.status != QuoteStatus::Revised)
        .count();
    assert_eq!(live_heads, 1);
    assert_eq!(history[0].status, QuoteStatus::Draft);
}

#[tokio::test]
async fn clone_starts_a_fresh_lineage() {
    let fx = fixture().await;
    let quote =
        fx.service.create(new_quote(fx.org_id, fx.contact_id)).await.expect("create");
    fx.service.send(&quote.id, "morgan@example.com", &[]).await.expect("send");

    let copy = fx.service.clone_quote(&quote.id).await.expect("clone");

    assert_ne!(copy.quote_number, quote.quote_number);
    assert_eq!(copy.version, 1);
    assert!(copy.previous_version_id.is_none());
    assert_eq!(copy.status, QuoteStatus::Draft);
    assert_eq!(fx.service.version_history(&copy.id).await.expect("history").len(), 1);
}

#[tokio::test]
async fn reject_after_accept_is_refused() {
    let fx = fixture().await;
    let quote =
        fx.service.create(new_quote(fx.org_id, fx.contact_id)).await.expect("create");
    fx.service.send(&quote.id, "morgan@example.com", &[]).await.expect("send");
    fx.service
        .accept(
            &quote.id,
            Signer {
                name: "Morgan Diaz".to_string(),
                email: "morgan@example.com".to_string(),
                signature_data: Some("data:image/png;base64,iVBORw0".to_string()),
                origin_address: Some("198.51.100.4".to_string()),
            },
        )
        .await
        .expect("accept");

    let error = fx
        .service
        .reject(&quote.id, Some("changed mind".to_string()))
        .await
        .expect_err("reject accepted");
    assert!(matches!(error, ServiceError::Domain(DomainError::InvalidOperation(_))));

    let stored =
        fx.quotes.find_by_id(&quote.id, false).await.expect("find").expect("present");
    assert_eq!(stored.status, QuoteStatus::Accepted);
    assert_eq!(stored.signer_name.as_deref(), Some("Morgan Diaz"));
}
