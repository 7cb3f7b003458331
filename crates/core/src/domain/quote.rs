use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::contact::ContactId;
use crate::domain::deal::{DealId, OrgId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub Uuid);

impl std::fmt::Display for QuoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Human-readable number shared by every version in a lineage.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteNumber(pub String);

impl QuoteNumber {
    /// Generates a fresh lineage number, e.g. `Q-202608-3F9A2C`.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
        Self(format!("Q-{}-{suffix}", now.format("%Y%m")))
    }
}

impl std::fmt::Display for QuoteNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    PendingApproval,
    Approved,
    Sent,
    Viewed,
    Accepted,
    Rejected,
    Expired,
    Revised,
}

impl QuoteStatus {
    /// A quote in one of these states is never mutated in place again;
    /// further edits must go through versioning.
    pub fn is_terminal_for_editing(self) -> bool {
        matches!(
            self,
            QuoteStatus::Accepted | QuoteStatus::Rejected | QuoteStatus::Expired | QuoteStatus::Revised
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuoteStatus::Draft => "draft",
            QuoteStatus::PendingApproval => "pending_approval",
            QuoteStatus::Approved => "approved",
            QuoteStatus::Sent => "sent",
            QuoteStatus::Viewed => "viewed",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Rejected => "rejected",
            QuoteStatus::Expired => "expired",
            QuoteStatus::Revised => "revised",
        }
    }
}

impl std::fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub discount_pct: Decimal,
    pub taxable: bool,
    pub tax_rate: Decimal,
    /// Optional items are presented to the customer as add-ons.
    pub optional: bool,
    /// Only selected items count toward the pricing summary.
    pub selected: bool,
    pub subtotal: Decimal,
    pub total: Decimal,
}

impl QuoteLineItem {
    pub fn new(name: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        let mut item = Self {
            name: name.into(),
            quantity,
            unit_price,
            discount_pct: Decimal::ZERO,
            taxable: false,
            tax_rate: Decimal::ZERO,
            optional: false,
            selected: true,
            subtotal: Decimal::ZERO,
            total: Decimal::ZERO,
        };
        item.recompute();
        item
    }

    pub fn recompute(&mut self) {
        self.subtotal = self.unit_price * Decimal::from(self.quantity);
        let discount = self.subtotal * self.discount_pct / Decimal::ONE_HUNDRED;
        let taxed_base = self.subtotal - discount;
        let tax =
            if self.taxable { taxed_base * self.tax_rate / Decimal::ONE_HUNDRED } else { Decimal::ZERO };
        self.total = taxed_base + tax;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSummary {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_monthly: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_annual: Option<Decimal>,
    pub setup_fee: Decimal,
}

impl Default for PricingSummary {
    fn default() -> Self {
        Self {
            subtotal: Decimal::ZERO,
            discount_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            total: Decimal::ZERO,
            recurring_monthly: None,
            recurring_annual: None,
            setup_fee: Decimal::ZERO,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_address: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct NewQuote {
    pub org_id: Option<OrgId>,
    pub deal_id: Option<DealId>,
    pub contact_id: Option<ContactId>,
    pub title: String,
    pub line_items: Vec<QuoteLineItem>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub recurring_monthly: Option<Decimal>,
    pub setup_fee: Option<Decimal>,
}

/// In-place or new-version edit payload. `None` fields are untouched.
#[derive(Clone, Debug, Default)]
pub struct QuotePatch {
    pub title: Option<String>,
    pub line_items: Option<Vec<QuoteLineItem>>,
    pub status: Option<QuoteStatus>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub recurring_monthly: Option<Decimal>,
    pub setup_fee: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub org_id: OrgId,
    pub quote_number: QuoteNumber,
    pub version: u32,
    pub previous_version_id: Option<QuoteId>,
    pub deal_id: Option<DealId>,
    pub contact_id: ContactId,
    pub title: String,
    pub line_items: Vec<QuoteLineItem>,
    pub pricing: PricingSummary,
    pub status: QuoteStatus,
    pub status_changed_at: DateTime<Utc>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub sent_to_email: Option<String>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub viewed_count: u32,
    pub signed_at: Option<DateTime<Utc>>,
    pub signer_name: Option<String>,
    pub signer_email: Option<String>,
    pub signature_data: Option<String>,
    pub signer_origin_address: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Quote {
    pub fn create(input: NewQuote, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let org_id = input
            .org_id
            .ok_or_else(|| DomainError::validation("organization id is required"))?;
        let contact_id = input
            .contact_id
            .ok_or_else(|| DomainError::validation("contact id is required"))?;
        if input.title.trim().is_empty() {
            return Err(DomainError::validation("title must not be empty"));
        }
        if input.line_items.iter().any(|item| item.unit_price < Decimal::ZERO) {
            return Err(DomainError::validation("unit price must not be negative"));
        }

        let mut quote = Quote {
            id: QuoteId(Uuid::new_v4()),
            org_id,
            quote_number: QuoteNumber::generate(now),
            version: 1,
            previous_version_id: None,
            deal_id: input.deal_id,
            contact_id,
            title: input.title,
            line_items: input.line_items,
            pricing: PricingSummary {
                recurring_monthly: input.recurring_monthly,
                setup_fee: input.setup_fee.unwrap_or(Decimal::ZERO),
                ..PricingSummary::default()
            },
            status: QuoteStatus::Draft,
            status_changed_at: now,
            valid_from: input.valid_from,
            valid_until: input.valid_until,
            sent_at: None,
            sent_to_email: None,
            viewed_at: None,
            viewed_count: 0,
            signed_at: None,
            signer_name: None,
            signer_email: None,
            signature_data: None,
            signer_origin_address: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        quote.recompute_pricing();
        Ok(quote)
    }

    /// Recompute line totals and fold selected lines into the summary.
    pub fn recompute_pricing(&mut self) {
        let mut subtotal = Decimal::ZERO;
        let mut discount_total = Decimal::ZERO;
        let mut tax_total = Decimal::ZERO;
        for item in &mut self.line_items {
            item.recompute();
            if !item.selected {
                continue;
            }
            subtotal += item.subtotal;
            discount_total += item.subtotal * item.discount_pct / Decimal::ONE_HUNDRED;
            if item.taxable {
                let taxed_base =
                    item.subtotal - item.subtotal * item.discount_pct / Decimal::ONE_HUNDRED;
                tax_total += taxed_base * item.tax_rate / Decimal::ONE_HUNDRED;
            }
        }
        self.pricing.subtotal = subtotal;
        self.pricing.discount_total = discount_total;
        self.pricing.tax_total = tax_total;
        self.pricing.total = subtotal - discount_total + tax_total + self.pricing.setup_fee;
        self.pricing.recurring_annual =
            self.pricing.recurring_monthly.map(|monthly| monthly * Decimal::from(12));
    }

    pub fn is_past_valid_until(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|until| until < now)
    }

    /// Record a customer view. The count always increments; `viewed_at` is
    /// first-view only; only a `Sent` quote flips to `Viewed`.
    pub fn record_view(&mut self, now: DateTime<Utc>) {
        self.viewed_count += 1;
        if self.viewed_at.is_none() {
            self.viewed_at = Some(now);
        }
        if self.status == QuoteStatus::Sent {
            self.status = QuoteStatus::Viewed;
            self.status_changed_at = now;
        }
        self.updated_at = now;
    }

    /// Check that an accept call would be legal right now, without
    /// mutating anything.
    pub fn ensure_acceptable(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            QuoteStatus::Accepted => {
                Err(DomainError::invalid_operation("quote is already accepted"))
            }
            QuoteStatus::Rejected | QuoteStatus::Expired | QuoteStatus::Revised => {
                Err(DomainError::invalid_operation(format!(
                    "quote in status {} cannot be accepted",
                    self.status
                )))
            }
            _ if self.is_past_valid_until(now) => {
                Err(DomainError::invalid_operation("quote validity window has passed"))
            }
            _ => Ok(()),
        }
    }

    pub fn accept(&mut self, signer: Signer, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_acceptable(now)?;
        self.status = QuoteStatus::Accepted;
        self.status_changed_at = now;
        self.signed_at = Some(now);
        self.signer_name = Some(signer.name);
        self.signer_email = Some(signer.email);
        self.signature_data = signer.signature_data;
        self.signer_origin_address = signer.origin_address;
        self.updated_at = now;
        Ok(())
    }

    pub fn reject(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status == QuoteStatus::Accepted {
            return Err(DomainError::invalid_operation("an accepted quote cannot be rejected"));
        }
        self.status = QuoteStatus::Rejected;
        self.status_changed_at = now;
        self.rejection_reason = reason;
        self.updated_at = now;
        Ok(())
    }

    pub fn expire(&mut self, now: DateTime<Utc>) {
        self.status = QuoteStatus::Expired;
        self.status_changed_at = now;
        self.updated_at = now;
    }

    pub fn mark_sent(&mut self, recipient: impl Into<String>, now: DateTime<Utc>) {
        self.status = QuoteStatus::Sent;
        self.status_changed_at = now;
        self.sent_at = Some(now);
        self.sent_to_email = Some(recipient.into());
        self.updated_at = now;
    }

    /// In-place edit. Rejected with `InvalidOperation` once the quote has
    /// reached a terminal-for-editing status; those records only change
    /// through `revise`.
    pub fn apply_patch(&mut self, patch: QuotePatch, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status.is_terminal_for_editing() {
            return Err(DomainError::invalid_operation(format!(
                "quote in status {} cannot be edited in place",
                self.status
            )));
        }
        self.merge_patch(patch, now);
        self.recompute_pricing();
        self.updated_at = now;
        Ok(())
    }

    fn merge_patch(&mut self, patch: QuotePatch, now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(items) = patch.line_items {
            self.line_items = items;
        }
        if let Some(status) = patch.status {
            if status != self.status {
                self.status = status;
                self.status_changed_at = now;
            }
        }
        if let Some(from) = patch.valid_from {
            self.valid_from = Some(from);
        }
        if let Some(until) = patch.valid_until {
            self.valid_until = Some(until);
        }
        if let Some(monthly) = patch.recurring_monthly {
            self.pricing.recurring_monthly = Some(monthly);
        }
        if let Some(fee) = patch.setup_fee {
            self.pricing.setup_fee = fee;
        }
    }

    /// Edit-after-send: flips this record to `Revised` and returns the
    /// successor draft. The successor copies every field, applies the
    /// patch on top, bumps the version, back-references this record, and
    /// clears all engagement state. The lineage keeps its quote number.
    ///
    /// Only the live head of a lineage may be revised; a record that is
    /// already `Revised` would mint a duplicate version number and a
    /// second draft head.
    pub fn revise(&mut self, patch: QuotePatch, now: DateTime<Utc>) -> Result<Quote, DomainError> {
        if self.status == QuoteStatus::Revised {
            return Err(DomainError::invalid_operation(
                "quote has already been superseded; revise the latest version",
            ));
        }
        let mut next = self.clone();
        next.id = QuoteId(Uuid::new_v4());
        next.version = self.version + 1;
        next.previous_version_id = Some(self.id);
        next.status = QuoteStatus::Draft;
        next.status_changed_at = now;
        next.created_at = now;
        next.updated_at = now;
        next.clear_engagement();
        // A status carried in the patch would fight the draft reset.
        next.merge_patch(QuotePatch { status: None, ..patch }, now);
        next.recompute_pricing();

        self.status = QuoteStatus::Revised;
        self.status_changed_at = now;
        self.updated_at = now;

        Ok(next)
    }

    /// Start an unrelated lineage from this quote's content: fresh number,
    /// version 1, no back-reference, draft, engagement cleared.
    pub fn clone_lineage(&self, now: DateTime<Utc>) -> Quote {
        let mut copy = self.clone();
        copy.id = QuoteId(Uuid::new_v4());
        copy.quote_number = QuoteNumber::generate(now);
        copy.version = 1;
        copy.previous_version_id = None;
        copy.status = QuoteStatus::Draft;
        copy.status_changed_at = now;
        copy.title = format!("{} (Copy)", self.title);
        copy.created_at = now;
        copy.updated_at = now;
        copy.deleted_at = None;
        copy.clear_engagement();
        copy.recompute_pricing();
        copy
    }

    fn clear_engagement(&mut self) {
        self.sent_at = None;
        self.sent_to_email = None;
        self.viewed_at = None;
        self.viewed_count = 0;
        self.signed_at = None;
        self.signer_name = None;
        self.signer_email = None;
        self.signature_data = None;
        self.signer_origin_address = None;
        self.rejection_reason = None;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
