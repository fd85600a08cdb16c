//! Per-source poll pipeline.
//!
//! One poll walks a source through fetch, normalization, reconciliation,
//! channel execution and persistence, then sweeps products the source no
//! longer lists:
//!
//! ```text
//! fetch ──▶ normalize ──▶ decide ──▶ execute ──▶ put ──▶ sweep
//!   │                                                    (execute + put
//!   └─ skip / exhausted retries: abandon, nothing written    per item)
//! ```
//!
//! Every write for a source happens before its sweep starts, and a source is
//! polled by at most one task per round.

/// Round scheduler driving [`SourcePoller`] over all sources.
pub mod runtime;

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::FetchError;
use crate::fetch::{FetchOutcome, Fetcher, SkipReason};
use crate::notify::{Delivery, NotificationCoordinator};
use crate::observation::ObservationNormalizer;
use crate::product::{ProductKey, ProductRecord};
use crate::reconcile::{decide, Decision, NotificationAction};
use crate::retry::{self, RetryPolicy};
use crate::storage::ProductStore;
use crate::sweep::SweepController;

/// Result of polling one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The page was reconciled and the source swept.
    Reconciled {
        key: ProductKey,
        action: NotificationAction,
        /// Products delisted by the sweep.
        swept: usize,
    },
    /// The fetcher declined the page; nothing was written.
    Skipped(SkipReason),
    /// Fetching or reading state failed; nothing was written.
    Abandoned { reason: String },
}

/// Polls a single source and applies the resulting transitions.
pub struct SourcePoller {
    store: Arc<dyn ProductStore>,
    fetcher: Arc<dyn Fetcher>,
    normalizer: ObservationNormalizer,
    coordinator: NotificationCoordinator,
    sweep: SweepController,
    fetch_retry: RetryPolicy,
}

impl std::fmt::Debug for SourcePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcePoller")
            .field("normalizer", &self.normalizer)
            .field("coordinator", &self.coordinator)
            .field("fetch_retry", &self.fetch_retry)
            .finish_non_exhaustive()
    }
}

impl SourcePoller {
    pub fn new(
        store: Arc<dyn ProductStore>,
        fetcher: Arc<dyn Fetcher>,
        normalizer: ObservationNormalizer,
        coordinator: NotificationCoordinator,
    ) -> Self {
        Self {
            store,
            fetcher,
            normalizer,
            coordinator,
            sweep: SweepController::new(),
            fetch_retry: RetryPolicy::fetch(1),
        }
    }

    /// Retry budget for page fetches.
    #[must_use]
    pub fn with_fetch_retry(mut self, policy: RetryPolicy) -> Self {
        self.fetch_retry = policy;
        self
    }

    /// Poll `source` once.
    pub async fn poll(&self, source: &str, delivery: Delivery) -> PollOutcome {
        let fetched = retry::with_backoff(
            self.fetch_retry,
            source,
            FetchError::is_retryable,
            |_| self.fetcher.fetch(source),
        )
        .await;

        let observation = match fetched {
            Ok(FetchOutcome::Observed(observation)) => observation,
            Ok(FetchOutcome::Skip(reason)) => {
                info!(source = %source, %reason, "skipping source");
                return PollOutcome::Skipped(reason);
            }
            Err(e) => {
                error!(source = %source, error = %e, "giving up on source this round");
                return PollOutcome::Abandoned {
                    reason: e.to_string(),
                };
            }
        };

        let normalized = self.normalizer.normalize(source, &observation);
        let key = normalized.key.clone();
        debug!(product = %key, out_of_stock = normalized.out_of_stock, "observed");

        let existing = match self.store.get(&key) {
            Ok(existing) => existing,
            Err(e) => {
                error!(product = %key, error = %e, "failed to read product state");
                return PollOutcome::Abandoned {
                    reason: e.to_string(),
                };
            }
        };

        let decision = decide(existing.as_ref(), &normalized);
        let action = decision.action.clone();
        self.apply(&key, decision, delivery).await;

        let seen: BTreeSet<ProductKey> = [key.clone()].into_iter().collect();
        let swept = self
            .sweep_source(source, &seen, &normalized.purchase_link, normalized.promo_code.as_deref(), delivery)
            .await;

        PollOutcome::Reconciled { key, action, swept }
    }

    async fn sweep_source(
        &self,
        source: &str,
        seen: &BTreeSet<ProductKey>,
        purchase_link: &str,
        promo_code: Option<&str>,
        delivery: Delivery,
    ) -> usize {
        let items = match self
            .sweep
            .sweep(self.store.as_ref(), source, seen, purchase_link, promo_code)
        {
            Ok(items) => items,
            Err(e) => {
                warn!(source = %source, error = %e, "sweep skipped, could not read state");
                return 0;
            }
        };

        let swept = items.len();
        for item in items {
            info!(product = %item.key, "no longer listed");
            self.apply(&item.key, item.decision, delivery).await;
        }
        swept
    }

    /// Execute a decision and persist its record, if any.
    async fn apply(&self, key: &ProductKey, decision: Decision, delivery: Delivery) {
        let Decision { action, record } = decision;
        let Some(record) = record else {
            return;
        };

        let record: ProductRecord = self.coordinator.execute(key, &action, record, delivery).await;
        if let Err(e) = self.store.put(key, record) {
            error!(product = %key, error = %e, "failed to persist product state");
        }
    }
}
