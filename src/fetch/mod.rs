//! Product page retrieval.
//!
//! A [`Fetcher`] turns a source URL into either an observation or a reason
//! to leave the source alone this round. Skips are not errors: they abandon
//! the poll without touching stored state and without sweeping.

use std::fmt;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::observation::ProductObservation;

mod http;
mod parse;

pub use http::HttpFetcher;
pub use parse::PageParser;

/// Why a fetched page was not used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// 400, 401, 403 or 404.
    ClientError(u16),
    /// Title announces maintenance.
    Maintenance,
    /// The request ended on the bare storefront root.
    RedirectedToRoot,
    EmptyTitle,
    /// Title lacks the storefront marker; not a product page.
    MissingMarker,
    /// Page looked like a product page but its structure was unexpected.
    ParseAnomaly(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientError(status) => write!(f, "client error status {status}"),
            Self::Maintenance => f.write_str("maintenance page"),
            Self::RedirectedToRoot => f.write_str("redirected to storefront root"),
            Self::EmptyTitle => f.write_str("empty page title"),
            Self::MissingMarker => f.write_str("title missing storefront marker"),
            Self::ParseAnomaly(detail) => write!(f, "unexpected page structure: {detail}"),
        }
    }
}

/// Result of one successful page retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Observed(ProductObservation),
    Skip(SkipReason),
}

/// Retrieves and interprets product pages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` once. Retrying is the caller's concern.
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError>;
}
