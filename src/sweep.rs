//! Implicit delisting of products that vanished from their source.
//!
//! A page that stops listing a product never says "sold out" for it, so
//! after each successful poll every stored key of that source that was not
//! observed is run through the out-of-stock branch of [`decide`] with its own
//! stored signatures. Records already out of stock produce no work, which
//! keeps repeated sweeps idempotent.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::StorageError;
use crate::observation::NormalizedObservation;
use crate::product::ProductKey;
use crate::reconcile::{decide, Decision};
use crate::storage::ProductStore;

/// Computes sweep decisions for one source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepController;

/// One product the sweep wants to transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepItem {
    pub key: ProductKey,
    pub decision: Decision,
}

impl SweepController {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decisions for keys of `source` missing from `seen`.
    ///
    /// `purchase_link` and `promo_code` are those of the current poll and are
    /// used in any delist message.
    pub fn sweep(
        &self,
        store: &dyn ProductStore,
        source: &str,
        seen: &BTreeSet<ProductKey>,
        purchase_link: &str,
        promo_code: Option<&str>,
    ) -> Result<Vec<SweepItem>, StorageError> {
        let mut items = Vec::new();

        for key in store.keys_for_source(source)?.difference(seen) {
            let Some(record) = store.get(key)? else {
                continue;
            };
            if record.out_of_stock {
                continue;
            }

            let implicit = NormalizedObservation {
                key: key.clone(),
                out_of_stock: true,
                price_signature: record.price_signature.clone(),
                feature_signature: record.feature_signature.clone(),
                purchase_link: purchase_link.to_string(),
                promo_code: promo_code.map(str::to_string),
            };

            let decision = decide(Some(&record), &implicit);
            debug!(product = %key, action = ?decision.action, "product missing from source");
            items.push(SweepItem {
                key: key.clone(),
                decision,
            });
        }

        Ok(items)
    }
}
