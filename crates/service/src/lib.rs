pub mod deals;
pub mod dispatch;
pub mod locks;
pub mod quotes;
pub mod reporting;

use thiserror::Error;

use pestline_core::errors::DomainError;
use pestline_db::repositories::RepositoryError;

pub use deals::DealPipelineService;
pub use dispatch::{
    DispatchError, HttpEmailDispatcher, QuoteDispatcher, QuoteRenderer, RenderedQuote,
};
pub use quotes::QuoteLifecycleService;
pub use reporting::ReportingService;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("document rendering failed: {0}")]
    Render(#[from] tera::Error),
}
