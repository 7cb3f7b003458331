//! Read-side folds over deals and quotes.
//!
//! Everything here is pure: callers load the org-scoped records and the
//! folds derive grouped summaries from the engines' computed fields.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::deal::{Deal, DealStage, DealStatus};
use crate::domain::quote::{Quote, QuoteStatus};

/// Optional narrowing applied before any fold. All bounds are inclusive.
#[derive(Clone, Debug, Default)]
pub struct DealFilter {
    pub owner_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_until: Option<DateTime<Utc>>,
    pub min_value_cents: Option<i64>,
    pub max_value_cents: Option<i64>,
}

impl DealFilter {
    pub fn matches(&self, deal: &Deal) -> bool {
        if self.owner_id.is_some() && deal.owner_id != self.owner_id {
            return false;
        }
        if self.created_from.is_some_and(|from| deal.created_at < from) {
            return false;
        }
        if self.created_until.is_some_and(|until| deal.created_at > until) {
            return false;
        }
        if self.min_value_cents.is_some_and(|min| deal.deal_value_cents < min) {
            return false;
        }
        if self.max_value_cents.is_some_and(|max| deal.deal_value_cents > max) {
            return false;
        }
        true
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineStageSummary {
    pub stage: DealStage,
    pub deals: Vec<Deal>,
    pub count: usize,
    pub total_value_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub stages: Vec<PipelineStageSummary>,
    pub open_deal_count: usize,
    pub total_value_cents: i64,
    pub total_weighted_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastBucket {
    /// Calendar month of the expected close date, `YYYY-MM`.
    pub month: String,
    pub count: usize,
    pub total_value_cents: i64,
    pub weighted_value_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WinRateStats {
    pub won: usize,
    pub lost: usize,
    pub win_rate_pct: f64,
    pub average_deal_size_cents: i64,
    pub total_value_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteStatusBucket {
    pub status: QuoteStatus,
    pub count: usize,
    pub total_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteStatistics {
    pub by_status: Vec<QuoteStatusBucket>,
    pub accepted_last_30_days: usize,
    pub rejected_last_30_days: usize,
    pub accepted_value_last_30_days: Decimal,
}

fn is_open(deal: &Deal) -> bool {
    deal.status == DealStatus::Open && !deal.is_deleted()
}

/// Open deals grouped by stage, in funnel order, with per-stage and
/// overall totals. Empty stages are included so a dashboard can render
/// the whole funnel.
pub fn pipeline_summary(deals: &[Deal], filter: &DealFilter) -> PipelineSummary {
    let mut by_stage: BTreeMap<usize, Vec<Deal>> = BTreeMap::new();
    let stages = DealStage::all();
    for deal in deals.iter().filter(|d| is_open(d) && filter.matches(d)) {
        let index = stages.iter().position(|s| *s == deal.stage).unwrap_or(0);
        by_stage.entry(index).or_default().push(deal.clone());
    }

    let mut summary_stages = Vec::with_capacity(stages.len());
    let mut open_deal_count = 0;
    let mut total_value_cents = 0;
    let mut total_weighted_cents = 0;
    for (index, stage) in stages.iter().enumerate() {
        let deals = by_stage.remove(&index).unwrap_or_default();
        let count = deals.len();
        let total: i64 = deals.iter().map(|d| d.deal_value_cents).sum();
        open_deal_count += count;
        total_value_cents += total;
        total_weighted_cents += deals.iter().map(|d| d.weighted_value_cents).sum::<i64>();
        summary_stages.push(PipelineStageSummary {
            stage: *stage,
            deals,
            count,
            total_value_cents: total,
        });
    }

    PipelineSummary {
        stages: summary_stages,
        open_deal_count,
        total_value_cents,
        total_weighted_cents,
    }
}

/// Open deals grouped by the calendar month of their expected close date.
/// Deals without an expected close date are skipped; buckets come back in
/// chronological order.
pub fn monthly_forecast(deals: &[Deal], filter: &DealFilter) -> Vec<ForecastBucket> {
    let mut buckets: BTreeMap<String, (usize, i64, i64)> = BTreeMap::new();
    for deal in deals.iter().filter(|d| is_open(d) && filter.matches(d)) {
        let Some(close_date) = deal.expected_close_date else { continue };
        let key = month_key(close_date);
        let entry = buckets.entry(key).or_insert((0, 0, 0));
        entry.0 += 1;
        entry.1 += deal.deal_value_cents;
        entry.2 += deal.weighted_value_cents;
    }

    buckets
        .into_iter()
        .map(|(month, (count, total, weighted))| ForecastBucket {
            month,
            count,
            total_value_cents: total,
            weighted_value_cents: weighted,
        })
        .collect()
}

fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Win/loss conversion plus sizing stats over non-deleted deals.
pub fn win_rate_stats(deals: &[Deal], filter: &DealFilter) -> WinRateStats {
    let considered: Vec<&Deal> =
        deals.iter().filter(|d| !d.is_deleted() && filter.matches(d)).collect();

    let won = considered.iter().filter(|d| d.status == DealStatus::Won).count();
    let lost = considered.iter().filter(|d| d.status == DealStatus::Lost).count();
    let closed = won + lost;
    let win_rate_pct = if closed == 0 { 0.0 } else { won as f64 / closed as f64 * 100.0 };

    let total_value_cents: i64 = considered.iter().map(|d| d.deal_value_cents).sum();
    let average_deal_size_cents =
        if considered.is_empty() { 0 } else { total_value_cents / considered.len() as i64 };

    WinRateStats { won, lost, win_rate_pct, average_deal_size_cents, total_value_cents }
}

/// Quote counts and summed totals per status, plus trailing-30-day
/// accept/reject activity keyed on the status-change timestamp.
pub fn quote_statistics(quotes: &[Quote], now: DateTime<Utc>) -> QuoteStatistics {
    let mut by_status: BTreeMap<&'static str, (QuoteStatus, usize, Decimal)> = BTreeMap::new();
    let cutoff = now - Duration::days(30);
    let mut accepted_last_30_days = 0;
    let mut rejected_last_30_days = 0;
    let mut accepted_value_last_30_days = Decimal::ZERO;

    for quote in quotes.iter().filter(|q| !q.is_deleted()) {
        let entry = by_status
            .entry(quote.status.as_str())
            .or_insert((quote.status, 0, Decimal::ZERO));
        entry.1 += 1;
        entry.2 += quote.pricing.total;

        if quote.status_changed_at >= cutoff {
            match quote.status {
                QuoteStatus::Accepted => {
                    accepted_last_30_days += 1;
                    accepted_value_last_30_days += quote.pricing.total;
                }
                QuoteStatus::Rejected => rejected_last_30_days += 1,
                _ => {}
            }
        }
    }

    QuoteStatistics {
        by_status: by_status
            .into_values()
            .map(|(status, count, total_amount)| QuoteStatusBucket { status, count, total_amount })
            .collect(),
        accepted_last_30_days,
        rejected_last_30_days,
        accepted_value_last_30_days,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{
        monthly_forecast, pipeline_summary, quote_statistics, win_rate_stats, DealFilter,
    };
    use crate::domain::contact::ContactId;
    use crate::domain::deal::{Deal, DealStage, NewDeal, OrgId};
    use crate::domain::quote::{NewQuote, Quote, QuoteLineItem, QuoteStatus, Signer};

    fn deal(value_cents: i64, stage: DealStage) -> Deal {
        let mut deal = Deal::create(
            NewDeal {
                org_id: Some(OrgId(Uuid::new_v4())),
                contact_id: Some(ContactId(Uuid::new_v4())),
                title: "Ant service".to_string(),
                deal_value_cents: value_cents,
                stage: Some(stage),
                ..NewDeal::default()
            },
            Utc::now(),
        )
        .expect("create deal");
        deal.recompute_derived();
        deal
    }

    fn quote(status: QuoteStatus, total_cents: i64) -> Quote {
        let mut quote = Quote::create(
            NewQuote {
                org_id: Some(OrgId(Uuid::new_v4())),
                contact_id: Some(ContactId(Uuid::new_v4())),
                title: "Service quote".to_string(),
                line_items: vec![QuoteLineItem::new(
                    "Service",
                    1,
                    Decimal::new(total_cents, 2),
                )],
                ..NewQuote::default()
            },
            Utc::now(),
        )
        .expect("create quote");
        match status {
            QuoteStatus::Accepted => {
                quote.mark_sent("a@example.com", Utc::now());
                quote
                    .accept(
                        Signer {
                            name: "A".to_string(),
                            email: "a@example.com".to_string(),
                            signature_data: None,
                            origin_address: None,
                        },
                        Utc::now(),
                    )
                    .expect("accept");
            }
            QuoteStatus::Rejected => {
                quote.reject(None, Utc::now()).expect("reject");
            }
            QuoteStatus::Sent => quote.mark_sent("a@example.com", Utc::now()),
            _ => {}
        }
        quote
    }

    #[test]
    fn pipeline_summary_groups_open_deals_by_stage() {
        let deals = vec![
            deal(10_000, DealStage::Lead),
            deal(20_000, DealStage::Lead),
            deal(50_000, DealStage::Negotiation),
        ];

        let summary = pipeline_summary(&deals, &DealFilter::default());

        assert_eq!(summary.open_deal_count, 3);
        assert_eq!(summary.total_value_cents, 80_000);
        // lead 10% of 30k + negotiation 70% of 50k
        assert_eq!(summary.total_weighted_cents, 3_000 + 35_000);

        let lead = summary.stages.iter().find(|s| s.stage == DealStage::Lead).unwrap();
        assert_eq!(lead.count, 2);
        assert_eq!(lead.total_value_cents, 30_000);

        let empty = summary.stages.iter().find(|s| s.stage == DealStage::ContractSent).unwrap();
        assert_eq!(empty.count, 0);
    }

    #[test]
    fn pipeline_summary_skips_closed_and_deleted_deals() {
        let mut won = deal(40_000, DealStage::Negotiation);
        won.mark_won(None, Utc::now());
        let mut deleted = deal(15_000, DealStage::Lead);
        deleted.deleted_at = Some(Utc::now());

        let summary =
            pipeline_summary(&[won, deleted, deal(5_000, DealStage::Lead)], &DealFilter::default());
        assert_eq!(summary.open_deal_count, 1);
        assert_eq!(summary.total_value_cents, 5_000);
    }

    #[test]
    fn forecast_buckets_by_expected_close_month() {
        let mut march = deal(10_000, DealStage::QuoteSent);
        march.expected_close_date = NaiveDate::from_ymd_opt(2026, 3, 15);
        let mut march_too = deal(30_000, DealStage::Negotiation);
        march_too.expected_close_date = NaiveDate::from_ymd_opt(2026, 3, 28);
        let mut april = deal(20_000, DealStage::Lead);
        april.expected_close_date = NaiveDate::from_ymd_opt(2026, 4, 2);
        let undated = deal(99_000, DealStage::Lead);

        let buckets =
            monthly_forecast(&[march, march_too, april, undated], &DealFilter::default());

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].month, "2026-03");
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[0].total_value_cents, 40_000);
        assert_eq!(buckets[1].month, "2026-04");
    }

    #[test]
    fn win_rate_is_zero_when_nothing_closed() {
        let stats = win_rate_stats(&[deal(10_000, DealStage::Lead)], &DealFilter::default());
        assert_eq!(stats.win_rate_pct, 0.0);
        assert_eq!(stats.total_value_cents, 10_000);
    }

    #[test]
    fn win_rate_counts_won_over_closed() {
        let mut won = deal(10_000, DealStage::Negotiation);
        won.mark_won(None, Utc::now());
        let mut lost_a = deal(10_000, DealStage::Negotiation);
        lost_a.mark_lost("price".to_string(), None, Utc::now());
        let mut lost_b = deal(10_000, DealStage::Negotiation);
        lost_b.mark_lost("timing".to_string(), None, Utc::now());
        let open = deal(10_000, DealStage::Lead);

        let stats = win_rate_stats(&[won, lost_a, lost_b, open], &DealFilter::default());
        assert_eq!(stats.won, 1);
        assert_eq!(stats.lost, 2);
        assert!((stats.win_rate_pct - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.average_deal_size_cents, 10_000);
    }

    #[test]
    fn deal_filter_narrows_by_value_bounds() {
        let deals = vec![deal(5_000, DealStage::Lead), deal(50_000, DealStage::Lead)];
        let filter = DealFilter { min_value_cents: Some(10_000), ..DealFilter::default() };

        let summary = pipeline_summary(&deals, &filter);
        assert_eq!(summary.open_deal_count, 1);
        assert_eq!(summary.total_value_cents, 50_000);
    }

    #[test]
    fn quote_statistics_groups_by_status_and_tracks_recent_outcomes() {
        let accepted = quote(QuoteStatus::Accepted, 30_000);
        let rejected = quote(QuoteStatus::Rejected, 10_000);
        let mut stale = quote(QuoteStatus::Accepted, 50_000);
        stale.status_changed_at = Utc::now() - Duration::days(45);
        let draft = quote(QuoteStatus::Draft, 5_000);

        let stats = quote_statistics(&[accepted, rejected, stale, draft], Utc::now());

        let accepted_bucket =
            stats.by_status.iter().find(|b| b.status == QuoteStatus::Accepted).unwrap();
        assert_eq!(accepted_bucket.count, 2);
        assert_eq!(stats.accepted_last_30_days, 1);
        assert_eq!(stats.rejected_last_30_days, 1);
        assert_eq!(stats.accepted_value_last_30_days, Decimal::new(30_000, 2));
    }
}
