//! Reconciliation of a fresh observation against stored product state.
//!
//! [`decide`] is a pure function: it never touches the store or the network.
//! Given the same `(existing, observation)` pair it always returns the same
//! decision, and feeding its resulting record back as `existing` yields
//! [`NotificationAction::None`].

use std::collections::BTreeMap;

use crate::message::{compose, Headline, MessageParts};
use crate::observation::NormalizedObservation;
use crate::product::ProductRecord;

/// Why a new message is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    /// First sighting, or an in-stock product whose price/features changed.
    NewListing,
    /// Product was out of stock and is available again.
    Restock,
}

/// What must happen on the notification channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationAction {
    None,
    SendNew { kind: ListingKind, text: String },
    EditExisting { text: String },
    /// Delisted but nothing to edit; only the record changes.
    MarkGoneNoMessage,
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: NotificationAction,
    /// Record to persist, or `None` when stored state is already current.
    pub record: Option<ProductRecord>,
}

impl Decision {
    fn unchanged() -> Self {
        Self {
            action: NotificationAction::None,
            record: None,
        }
    }
}

/// Decide the transition for one product.
#[must_use]
pub fn decide(existing: Option<&ProductRecord>, observation: &NormalizedObservation) -> Decision {
    if observation.out_of_stock {
        decide_out_of_stock(existing, observation)
    } else {
        decide_in_stock(existing, observation)
    }
}

fn decide_in_stock(existing: Option<&ProductRecord>, obs: &NormalizedObservation) -> Decision {
    let kind = match existing {
        Some(prev)
            if prev.price_signature == obs.price_signature
                && prev.feature_signature == obs.feature_signature
                && !prev.out_of_stock =>
        {
            return Decision::unchanged();
        }
        // Sold-out records restock even when the signatures match.
        Some(prev) if prev.out_of_stock => ListingKind::Restock,
        Some(_) | None => ListingKind::NewListing,
    };

    let headline = match kind {
        ListingKind::NewListing => Headline::NewListing,
        ListingKind::Restock => Headline::Restock,
    };

    let text = compose(
        headline,
        &MessageParts {
            name: obs.display_name(),
            price_signature: obs.price_signature.as_deref(),
            feature_signature: obs.feature_signature.as_deref(),
            purchase_link: &obs.purchase_link,
            promo_code: obs.promo_code.as_deref(),
        },
    );

    Decision {
        action: NotificationAction::SendNew { kind, text },
        record: Some(ProductRecord {
            price_signature: obs.price_signature.clone(),
            feature_signature: obs.feature_signature.clone(),
            purchase_link: obs.purchase_link.clone(),
            out_of_stock: false,
            // Filled in by the coordinator with the handles of this send.
            message_handles: BTreeMap::new(),
        }),
    }
}

fn decide_out_of_stock(existing: Option<&ProductRecord>, obs: &NormalizedObservation) -> Decision {
    let Some(prev) = existing else {
        return Decision {
            action: NotificationAction::None,
            record: Some(ProductRecord {
                price_signature: None,
                feature_signature: None,
                purchase_link: obs.purchase_link.clone(),
                out_of_stock: true,
                message_handles: BTreeMap::new(),
            }),
        };
    };

    if prev.out_of_stock {
        return Decision::unchanged();
    }

    let record = ProductRecord {
        out_of_stock: true,
        purchase_link: obs.purchase_link.clone(),
        ..prev.clone()
    };

    // Never describe a product with placeholder signatures.
    if !prev.has_live_message() || !prev.has_known_signatures() {
        return Decision {
            action: NotificationAction::MarkGoneNoMessage,
            record: Some(record),
        };
    }

    let text = compose(
        Headline::Delisted,
        &MessageParts {
            name: obs.display_name(),
            price_signature: prev.price_signature.as_deref(),
            feature_signature: prev.feature_signature.as_deref(),
            purchase_link: &obs.purchase_link,
            promo_code: obs.promo_code.as_deref(),
        },
    );

    Decision {
        action: NotificationAction::EditExisting { text },
        record: Some(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{ChannelId, MessageHandle, ProductKey};

    const SOURCE: &str = "https://shop.test/cart.php?a=add&pid=1";

    fn observed(out_of_stock: bool, price: &str, features: &str) -> NormalizedObservation {
        NormalizedObservation {
            key: ProductKey::new(SOURCE, "MINI"),
            out_of_stock,
            price_signature: (!out_of_stock).then(|| price.to_string()),
            feature_signature: (!out_of_stock).then(|| features.to_string()),
            purchase_link: SOURCE.to_string(),
            promo_code: None,
        }
    }

    fn record(out_of_stock: bool, price: &str, features: &str) -> ProductRecord {
        ProductRecord {
            price_signature: Some(price.to_string()),
            feature_signature: Some(features.to_string()),
            purchase_link: SOURCE.to_string(),
            out_of_stock,
            message_handles: BTreeMap::new(),
        }
    }

    fn with_handle(mut record: ProductRecord) -> ProductRecord {
        record.message_handles.insert(ChannelId::new("c1"), MessageHandle(11));
        record
    }

    #[test]
    fn test_first_in_stock_is_new_listing() {
        let decision = decide(None, &observed(false, "A", "F"));
        assert!(matches!(
            decision.action,
            NotificationAction::SendNew { kind: ListingKind::NewListing, .. }
        ));
        let rec = decision.record.unwrap();
        assert!(!rec.out_of_stock);
        assert_eq!(rec.price_signature.as_deref(), Some("A"));
        assert!(rec.message_handles.is_empty());
    }

    #[test]
    fn test_decide_is_idempotent() {
        let obs = observed(false, "A", "F");
        let first = decide(None, &obs);
        let stored = first.record.unwrap();

        let second = decide(Some(&stored), &obs);
        assert_eq!(second.action, NotificationAction::None);
        assert!(second.record.is_none());
    }

    #[test]
    fn test_unchanged_in_stock_is_noop() {
        let existing = with_handle(record(false, "A", "F"));
        let decision = decide(Some(&existing), &observed(false, "A", "F"));
        assert_eq!(decision, Decision::unchanged());
    }

    #[test]
    fn test_price_change_is_new_listing() {
        let existing = with_handle(record(false, "A", "F"));
        let decision = decide(Some(&existing), &observed(false, "B", "F"));
        let NotificationAction::SendNew { kind, text } = decision.action else {
            panic!("expected SendNew");
        };
        assert_eq!(kind, ListingKind::NewListing);
        assert!(text.contains("New listing"));
        assert!(decision.record.unwrap().message_handles.is_empty());
    }

    #[test]
    fn test_feature_change_is_new_listing() {
        let existing = record(false, "A", "F");
        let decision = decide(Some(&existing), &observed(false, "A", "G"));
        assert!(matches!(
            decision.action,
            NotificationAction::SendNew { kind: ListingKind::NewListing, .. }
        ));
    }

    #[test]
    fn test_restock_round_trip() {
        let existing = record(true, "A", "F");
        let decision = decide(Some(&existing), &observed(false, "A", "F"));
        let NotificationAction::SendNew { kind, text } = decision.action else {
            panic!("expected SendNew");
        };
        assert_eq!(kind, ListingKind::Restock);
        assert!(text.contains("Restocked"));
        assert!(!decision.record.unwrap().out_of_stock);
    }

    #[test]
    fn test_restock_after_unknown_first_sighting() {
        let first = decide(None, &observed(true, "", ""));
        let stored = first.record.unwrap();

        let decision = decide(Some(&stored), &observed(false, "A", "F"));
        assert!(matches!(
            decision.action,
            NotificationAction::SendNew { kind: ListingKind::Restock, .. }
        ));
    }

    #[test]
    fn test_delist_with_handle_edits_using_stored_signatures() {
        let existing = with_handle(record(false, "$5 USD Monthly", "RAM: 1 GB"));
        let decision = decide(Some(&existing), &observed(true, "", ""));
        let NotificationAction::EditExisting { text } = decision.action else {
            panic!("expected EditExisting");
        };
        assert!(text.contains("delisted"));
        assert!(text.contains("Memory: 1 GB"));
        assert!(!text.contains("unknown"));

        let rec = decision.record.unwrap();
        assert!(rec.out_of_stock);
        assert_eq!(rec.price_signature.as_deref(), Some("$5 USD Monthly"));
        assert_eq!(rec.message_handles.len(), 1);
    }

    #[test]
    fn test_delist_without_handle_marks_gone() {
        let existing = record(false, "A", "F");
        let decision = decide(Some(&existing), &observed(true, "", ""));
        assert_eq!(decision.action, NotificationAction::MarkGoneNoMessage);
        let rec = decision.record.unwrap();
        assert!(rec.out_of_stock);
        assert_eq!(rec.feature_signature.as_deref(), Some("F"));
    }

    #[test]
    fn test_delist_with_unknown_signatures_never_edits() {
        let mut existing = with_handle(record(false, "A", "F"));
        existing.price_signature = None;
        let decision = decide(Some(&existing), &observed(true, "", ""));
        assert_eq!(decision.action, NotificationAction::MarkGoneNoMessage);
    }

    #[test]
    fn test_first_observation_out_of_stock() {
        let decision = decide(None, &observed(true, "", ""));
        assert_eq!(decision.action, NotificationAction::None);
        let rec = decision.record.unwrap();
        assert!(rec.out_of_stock);
        assert!(rec.price_signature.is_none());
        assert!(rec.feature_signature.is_none());

        // Comparing against the unknown record must not misfire.
        let again = decide(Some(&rec), &observed(true, "", ""));
        assert_eq!(again, Decision::unchanged());
    }

    #[test]
    fn test_already_out_of_stock_is_noop() {
        let existing = with_handle(record(true, "A", "F"));
        let decision = decide(Some(&existing), &observed(true, "", ""));
        assert_eq!(decision, Decision::unchanged());
    }
}
