//! Raw page observations and their canonical comparison form.

use std::sync::OnceLock;

use regex::Regex;

use crate::product::ProductKey;

/// Separator used when joining price or feature lines into a signature.
pub const SIGNATURE_SEPARATOR: &str = "<br />";

/// Name prefix the storefront puts in front of every plan name.
pub const DEFAULT_NAME_PREFIX: &str = "Basic VPS - Self-managed - ";

/// Feature lines worth comparing; everything else on the page is noise.
pub const DEFAULT_ALLOWED_FEATURES: &[&str] =
    &["SSD", "RAM", "CPU", "Transfer", "Link speed", "Location"];

/// What the fetcher saw on one product page during one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductObservation {
    pub out_of_stock: bool,
    /// Product name as printed on the page, if any.
    pub raw_name: Option<String>,
    /// Billing cycle options, one per line.
    pub price_lines: Vec<String>,
    /// Text lines of the product box, name excluded.
    pub feature_lines: Vec<String>,
    pub promo_code: Option<String>,
}

/// Observation reduced to the fields the reconciler compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedObservation {
    pub key: ProductKey,
    pub out_of_stock: bool,
    /// `None` means unknown (product page shows it sold out).
    pub price_signature: Option<String>,
    pub feature_signature: Option<String>,
    pub purchase_link: String,
    pub promo_code: Option<String>,
}

impl NormalizedObservation {
    /// Display name used in messages.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.key.name()
    }
}

/// Maps raw observations into [`NormalizedObservation`]s.
#[derive(Debug, Clone)]
pub struct ObservationNormalizer {
    name_prefix: String,
    allowed_features: Vec<String>,
    affiliate_id: Option<String>,
}

impl Default for ObservationNormalizer {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            allowed_features: DEFAULT_ALLOWED_FEATURES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            affiliate_id: None,
        }
    }
}

impl ObservationNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag purchase links with an affiliate id.
    #[must_use]
    pub fn with_affiliate_id(mut self, affiliate_id: Option<String>) -> Self {
        self.affiliate_id = affiliate_id.filter(|id| !id.trim().is_empty());
        self
    }

    /// Canonicalize an observation made on `source`.
    #[must_use]
    pub fn normalize(&self, source: &str, observation: &ProductObservation) -> NormalizedObservation {
        let purchase_link = self.purchase_link(source);

        if observation.out_of_stock {
            return NormalizedObservation {
                key: ProductKey::new(source, &placeholder_name(source)),
                out_of_stock: true,
                price_signature: None,
                feature_signature: None,
                purchase_link,
                promo_code: observation.promo_code.clone(),
            };
        }

        let name = observation
            .raw_name
            .as_deref()
            .map(|raw| self.canonical_name(raw))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string());

        NormalizedObservation {
            key: ProductKey::new(source, &name),
            out_of_stock: false,
            price_signature: Some(join_lines(&observation.price_lines)),
            feature_signature: Some(self.feature_signature(&observation.feature_lines)),
            purchase_link,
            promo_code: observation.promo_code.clone(),
        }
    }

    fn canonical_name(&self, raw: &str) -> String {
        raw.trim().replace(&self.name_prefix, "").trim().to_string()
    }

    fn feature_signature(&self, lines: &[String]) -> String {
        let kept: Vec<String> = lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| self.allowed_features.iter().any(|key| line.starts_with(key.as_str())))
            .map(str::to_string)
            .collect();
        kept.join(SIGNATURE_SEPARATOR)
    }

    /// Rewrites an add-to-cart URL into an affiliate-tagged purchase link.
    #[must_use]
    pub fn purchase_link(&self, source: &str) -> String {
        let Some(aff) = &self.affiliate_id else {
            return source.to_string();
        };

        let mut link = source.replace("cart.php?a=add", &format!("aff.php?aff={aff}"));
        if !link.contains("aff=") {
            link.push(if link.contains('?') { '&' } else { '?' });
            link.push_str("aff=");
            link.push_str(aff);
        }
        link
    }
}

const UNKNOWN_PRODUCT: &str = "unknown product";

fn join_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(SIGNATURE_SEPARATOR)
}

/// Sold-out pages hide the product box, so the name comes from the URL.
fn placeholder_name(source: &str) -> String {
    static PID: OnceLock<Option<Regex>> = OnceLock::new();
    let pid = PID.get_or_init(|| Regex::new(r"pid=(\d+)").ok());

    pid.as_ref()
        .and_then(|re| re.captures(source))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| UNKNOWN_PRODUCT.to_string(), |m| format!("PID {}", m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "https://shop.test/cart.php?a=add&pid=44";

    fn in_stock() -> ProductObservation {
        ProductObservation {
            out_of_stock: false,
            raw_name: Some("Basic VPS - Self-managed - SPECIAL 20G KVM".to_string()),
            price_lines: vec![
                "$49.99 USD Annually".to_string(),
                " ".to_string(),
                "$89.99 USD Biennially".to_string(),
            ],
            feature_lines: vec![
                "SSD: 20 GB RAID-10".to_string(),
                "RAM: 1024 MB".to_string(),
                "Order now!".to_string(),
                "Location: Los Angeles".to_string(),
            ],
            promo_code: None,
        }
    }

    #[test]
    fn test_normalize_in_stock() {
        let norm = ObservationNormalizer::new().normalize(SOURCE, &in_stock());
        assert_eq!(norm.display_name(), "SPECIAL 20G KVM");
        assert_eq!(norm.key.source(), SOURCE);
        assert_eq!(
            norm.price_signature.as_deref(),
            Some("$49.99 USD Annually<br />$89.99 USD Biennially")
        );
        assert_eq!(
            norm.feature_signature.as_deref(),
            Some("SSD: 20 GB RAID-10<br />RAM: 1024 MB<br />Location: Los Angeles")
        );
        assert!(!norm.out_of_stock);
    }

    #[test]
    fn test_normalize_out_of_stock_uses_pid_and_unknown_signatures() {
        let obs = ProductObservation {
            out_of_stock: true,
            ..ProductObservation::default()
        };
        let norm = ObservationNormalizer::new().normalize(SOURCE, &obs);
        assert_eq!(norm.display_name(), "PID 44");
        assert!(norm.price_signature.is_none());
        assert!(norm.feature_signature.is_none());
    }

    #[test]
    fn test_normalize_out_of_stock_without_pid() {
        let obs = ProductObservation {
            out_of_stock: true,
            ..ProductObservation::default()
        };
        let norm = ObservationNormalizer::new().normalize("https://shop.test/store", &obs);
        assert_eq!(norm.display_name(), UNKNOWN_PRODUCT);
    }

    #[test]
    fn test_signatures_are_stable_across_whitespace() {
        let normalizer = ObservationNormalizer::new();
        let mut padded = in_stock();
        padded.feature_lines = padded
            .feature_lines
            .iter()
            .map(|l| format!("  {l}  "))
            .collect();
        assert_eq!(
            normalizer.normalize(SOURCE, &in_stock()),
            normalizer.normalize(SOURCE, &padded)
        );
    }

    #[test]
    fn test_purchase_link_without_affiliate() {
        let normalizer = ObservationNormalizer::new();
        assert_eq!(normalizer.purchase_link(SOURCE), SOURCE);
    }

    #[test]
    fn test_purchase_link_rewrites_cart_url() {
        let normalizer = ObservationNormalizer::new().with_affiliate_id(Some("55580".to_string()));
        assert_eq!(
            normalizer.purchase_link(SOURCE),
            "https://shop.test/aff.php?aff=55580&pid=44"
        );
        assert_eq!(
            normalizer.purchase_link("https://shop.test/store"),
            "https://shop.test/store?aff=55580"
        );
        assert_eq!(
            normalizer.purchase_link("https://shop.test/store?x=1"),
            "https://shop.test/store?x=1&aff=55580"
        );
    }
}
