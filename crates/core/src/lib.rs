pub mod analytics;
pub mod config;
pub mod domain;
pub mod errors;

pub use analytics::{
    DealFilter, ForecastBucket, PipelineStageSummary, PipelineSummary, QuoteStatistics,
    QuoteStatusBucket, WinRateStats,
};
pub use domain::contact::{Contact, ContactId};
pub use domain::deal::{
    Deal, DealId, DealPatch, DealStage, DealStatus, LeadId, NewDeal, OrgId, StageHistoryEntry,
};
pub use domain::quote::{
    NewQuote, PricingSummary, Quote, QuoteId, QuoteLineItem, QuoteNumber, QuotePatch, QuoteStatus,
    Signer,
};
pub use errors::DomainError;
