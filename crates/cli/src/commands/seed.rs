use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use pestline_core::config::AppConfig;
use pestline_core::domain::contact::{Contact, ContactId};
use pestline_core::domain::deal::{DealStage, NewDeal, OrgId};
use pestline_core::domain::quote::{NewQuote, QuoteLineItem};
use pestline_db::migrations;
use pestline_db::repositories::{ContactRepository, SqlContactRepository, SqlDealRepository};
use pestline_service::DealPipelineService;

use super::{connect, quote_service};

/// Loads a small demo organization: two contacts, three deals spread
/// across the funnel, and a quote against the negotiation deal.
pub async fn run(config: &AppConfig) -> anyhow::Result<String> {
    let pool = connect(config).await?;
    migrations::run_pending(&pool).await.context("migration failed")?;

    let org_id = OrgId(Uuid::new_v4());
    let contacts = SqlContactRepository::new(pool.clone());

    let homeowner = Contact {
        id: ContactId(Uuid::new_v4()),
        org_id,
        name: "Avery Kim".to_string(),
        email: Some("avery@example.com".to_string()),
    };
    let restaurant = Contact {
        id: ContactId(Uuid::new_v4()),
        org_id,
        name: "Harbor Grill".to_string(),
        email: Some("manager@harborgrill.example".to_string()),
    };
    contacts.save(&homeowner).await.context("seed contact")?;
    contacts.save(&restaurant).await.context("seed contact")?;

    let deals = DealPipelineService::new(Arc::new(SqlDealRepository::new(pool.clone())));

    let lead = deals
        .create(NewDeal {
            org_id: Some(org_id),
            contact_id: Some(homeowner.id),
            title: "One-time wasp nest removal".to_string(),
            deal_value_cents: 18_500,
            ..NewDeal::default()
        })
        .await
        .context("seed deal")?;

    let inspection = deals
        .create(NewDeal {
            org_id: Some(org_id),
            contact_id: Some(homeowner.id),
            title: "Termite inspection and treatment".to_string(),
            deal_value_cents: 240_000,
            stage: Some(DealStage::InspectionScheduled),
            expected_close_date: Some((Utc::now() + Duration::days(45)).date_naive()),
            ..NewDeal::default()
        })
        .await
        .context("seed deal")?;

    let negotiation = deals
        .create(NewDeal {
            org_id: Some(org_id),
            contact_id: Some(restaurant.id),
            title: "Monthly commercial kitchen service".to_string(),
            deal_value_cents: 50_000,
            recurring_value_cents: Some(22_000),
            contract_length_months: Some(12),
            stage: Some(DealStage::Negotiation),
            expected_close_date: Some((Utc::now() + Duration::days(14)).date_naive()),
            ..NewDeal::default()
        })
        .await
        .context("seed deal")?;

    let quotes = quote_service(config, &pool)?;
    let quote = quotes
        .create(NewQuote {
            org_id: Some(org_id),
            deal_id: Some(negotiation.id),
            contact_id: Some(restaurant.id),
            title: "Commercial kitchen pest program".to_string(),
            line_items: vec![
                QuoteLineItem::new("Initial deep treatment", 1, Decimal::new(50_000, 2)),
                QuoteLineItem::new("Monthly service visit", 12, Decimal::new(22_000, 2)),
            ],
            valid_until: Some(Utc::now() + Duration::days(30)),
            recurring_monthly: Some(Decimal::new(22_000, 2)),
            ..NewQuote::default()
        })
        .await
        .context("seed quote")?;

    Ok(format!(
        "seeded org {org_id}\n  contacts: {}, {}\n  deals: {}, {}, {}\n  quote: {} ({})",
        homeowner.id, restaurant.id, lead.id, inspection.id, negotiation.id, quote.id,
        quote.quote_number
    ))
}
