//! reqwest-backed [`Fetcher`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{FetchError, MonitorError, MonitorResult};

use super::parse::PageParser;
use super::{FetchOutcome, Fetcher, SkipReason};

/// How a response status is handled before the body is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusAction {
    Parse,
    /// Unusual status; the body is still worth a look.
    ParseWithWarning,
    Skip,
    Fail,
}

fn status_action(status: u16) -> StatusAction {
    match status {
        200 => StatusAction::Parse,
        400 | 401 | 403 | 404 => StatusAction::Skip,
        500..=599 => StatusAction::Fail,
        _ => StatusAction::ParseWithWarning,
    }
}

/// Fetches product pages over HTTP and parses them.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
    parser: PageParser,
    storefront_root: String,
}

impl HttpFetcher {
    /// `storefront_root` is the page the shop redirects to when a product no
    /// longer exists.
    pub fn new(
        timeout: Duration,
        storefront_root: impl Into<String>,
        parser: PageParser,
    ) -> MonitorResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("stockwatch/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            parser,
            storefront_root: storefront_root.into(),
        })
    }

    fn is_storefront_root(&self, final_url: &str) -> bool {
        final_url.trim_end_matches('/') == self.storefront_root.trim_end_matches('/')
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        match status_action(status) {
            StatusAction::Parse => {}
            StatusAction::ParseWithWarning => {
                warn!(source = %url, status, "unexpected status, parsing anyway");
            }
            StatusAction::Skip => return Ok(FetchOutcome::Skip(SkipReason::ClientError(status))),
            StatusAction::Fail => {
                return Err(FetchError::ServerError {
                    url: url.to_string(),
                    status,
                })
            }
        }

        if self.is_storefront_root(response.url().as_str()) {
            debug!(source = %url, final_url = %response.url(), "redirected to storefront root");
            return Ok(FetchOutcome::Skip(SkipReason::RedirectedToRoot));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Body {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        Ok(self.parser.parse(&body))
    }
}
