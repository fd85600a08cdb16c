//! HTML interpretation of storefront product pages.

use std::sync::OnceLock;

use scraper::{ElementRef, Html, Selector};

use crate::observation::ProductObservation;

use super::{FetchOutcome, SkipReason};

const PROMO_MARKER: &str = "promo code:";
const OUT_OF_STOCK_TEXT: &str = "Out of Stock";
const MAINTENANCE_MARKERS: &[&str] = &["Maintenance", "维护"];

struct PageSelectors {
    title: Selector,
    errorbox: Selector,
    cartbox: Selector,
    strong: Selector,
    billing_cycle: Selector,
}

impl PageSelectors {
    fn build() -> Option<Self> {
        Some(Self {
            title: Selector::parse("title").ok()?,
            errorbox: Selector::parse("div.errorbox").ok()?,
            cartbox: Selector::parse("div.cartbox").ok()?,
            strong: Selector::parse("strong").ok()?,
            billing_cycle: Selector::parse("select[name=\"billingcycle\"]").ok()?,
        })
    }

    fn get() -> Option<&'static Self> {
        static SELECTORS: OnceLock<Option<PageSelectors>> = OnceLock::new();
        SELECTORS.get_or_init(Self::build).as_ref()
    }
}

/// Parses product pages of one storefront.
#[derive(Debug, Clone)]
pub struct PageParser {
    title_marker: String,
}

impl PageParser {
    /// `title_marker` must appear in the `<title>` of every genuine page.
    pub fn new(title_marker: impl Into<String>) -> Self {
        Self {
            title_marker: title_marker.into(),
        }
    }

    pub fn parse(&self, html: &str) -> FetchOutcome {
        let Some(selectors) = PageSelectors::get() else {
            return FetchOutcome::Skip(SkipReason::ParseAnomaly("selectors unavailable".to_string()));
        };
        let document = Html::parse_document(html);

        let title = document
            .select(&selectors.title)
            .next()
            .map(collapse_text)
            .unwrap_or_default();
        if title.is_empty() {
            return FetchOutcome::Skip(SkipReason::EmptyTitle);
        }
        if MAINTENANCE_MARKERS.iter().any(|m| title.contains(m)) {
            return FetchOutcome::Skip(SkipReason::Maintenance);
        }
        if !title.contains(&self.title_marker) {
            return FetchOutcome::Skip(SkipReason::MissingMarker);
        }

        let promo_code = promo_code(&document);

        let out_of_stock = document
            .select(&selectors.errorbox)
            .any(|b| collapse_text(b) == OUT_OF_STOCK_TEXT);
        if out_of_stock {
            return FetchOutcome::Observed(ProductObservation {
                out_of_stock: true,
                promo_code,
                ..ProductObservation::default()
            });
        }

        let Some(cartbox) = document.select(&selectors.cartbox).next() else {
            return FetchOutcome::Skip(SkipReason::ParseAnomaly("no product box".to_string()));
        };

        let raw_name = cartbox
            .select(&selectors.strong)
            .next()
            .map(collapse_text)
            .filter(|n| !n.is_empty());

        let feature_lines = text_lines(cartbox)
            .into_iter()
            .filter(|line| Some(line) != raw_name.as_ref())
            .collect();

        let price_lines = document
            .select(&selectors.billing_cycle)
            .next()
            .map(text_lines)
            .unwrap_or_default();

        FetchOutcome::Observed(ProductObservation {
            out_of_stock: false,
            raw_name,
            price_lines,
            feature_lines,
            promo_code,
        })
    }
}

/// Trimmed, non-empty text nodes under `element`, in document order.
fn text_lines(element: ElementRef<'_>) -> Vec<String> {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn collapse_text(element: ElementRef<'_>) -> String {
    text_lines(element).join(" ")
}

/// Promo codes are published in an HTML comment such as `<!-- promo code: ABC -->`.
fn promo_code(document: &Html) -> Option<String> {
    document.tree.root().descendants().find_map(|node| {
        let comment = node.value().as_comment()?;
        let text: &str = comment;
        let lower = text.to_lowercase();
        let start = lower.find(PROMO_MARKER)? + PROMO_MARKER.len();
        let code = text.get(start..)?.trim().trim_end_matches("-->").trim();
        (!code.is_empty()).then(|| code.to_string())
    })
}
