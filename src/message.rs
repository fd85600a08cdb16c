//! Notification text for listing, restock and delist events.
//!
//! Messages use Telegram's HTML parse mode.

use std::sync::OnceLock;

use regex::Regex;

use crate::observation::SIGNATURE_SEPARATOR;

const FEATURE_LABELS: &[(&str, &str)] = &[
    ("SSD", "Disk"),
    ("RAM", "Memory"),
    ("Transfer", "Traffic"),
    ("Link speed", "Bandwidth"),
];

const PERIOD_LABELS: &[(&str, &str)] = &[
    ("Monthly", "per month"),
    ("Quarterly", "per quarter"),
    ("Semi-Annually", "per half year"),
    ("Annually", "per year"),
];

/// Header shown for an in-stock notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Headline {
    NewListing,
    Restock,
    Delisted,
}

/// Everything needed to render one product message.
#[derive(Debug, Clone, Copy)]
pub struct MessageParts<'a> {
    pub name: &'a str,
    pub price_signature: Option<&'a str>,
    pub feature_signature: Option<&'a str>,
    pub purchase_link: &'a str,
    pub promo_code: Option<&'a str>,
}

/// Render a message for `headline`.
#[must_use]
pub fn compose(headline: Headline, parts: &MessageParts<'_>) -> String {
    let delisted = headline == Headline::Delisted;
    let name = escape_html(parts.name);
    let header = match headline {
        Headline::NewListing => format!("✅ New listing - {name}"),
        Headline::Restock => format!("✅ Restocked - {name}"),
        Headline::Delisted => format!("❌ {name} - delisted or sold out"),
    };

    let mut lines = vec![header, String::new(), "🔧 Configuration:".to_string()];
    for feature in split_signature(parts.feature_signature) {
        lines.push(format!("• {}", translate_feature(feature)));
    }

    lines.push(String::new());
    lines.push("💰 Price:".to_string());
    for price in price_lines(parts.price_signature) {
        lines.push(format!("• {price}"));
    }

    if let Some(code) = parts.promo_code {
        lines.push(String::new());
        lines.push(format!("🏷️ Promo code: <code>{}</code>", escape_html(code)));
    }

    if !parts.purchase_link.is_empty() {
        lines.push(String::new());
        let link = escape_html(parts.purchase_link);
        if delisted {
            lines.push(format!("🛍️ Buy: <s>{link}</s>"));
        } else {
            lines.push(format!("🛍️ Buy: {link}"));
        }
    }

    lines.join("\n")
}

fn split_signature(signature: Option<&str>) -> Vec<&str> {
    match signature {
        Some(sig) => sig
            .split(SIGNATURE_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect(),
        None => vec!["unknown"],
    }
}

fn translate_feature(feature: &str) -> String {
    let mut out = escape_html(feature);
    for (label, translated) in FEATURE_LABELS {
        if out.starts_with(label) {
            out = format!("{translated}{}", &out[label.len()..]);
            break;
        }
    }
    out
}

fn price_lines(signature: Option<&str>) -> Vec<String> {
    static PRICE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(sig) = signature else {
        return vec!["unknown".to_string()];
    };

    let re = PRICE.get_or_init(|| {
        Regex::new(r"(\$[0-9.,]+\s*USD)\s*(Monthly|Quarterly|Semi-Annually|Annually)").ok()
    });

    let matched: Vec<String> = re
        .as_ref()
        .map(|re| {
            re.captures_iter(sig)
                .map(|caps| {
                    let amount = caps.get(1).map_or("", |m| m.as_str());
                    let period = caps.get(2).map_or("", |m| m.as_str());
                    let label = PERIOD_LABELS
                        .iter()
                        .find(|(p, _)| *p == period)
                        .map_or(period, |(_, l)| *l);
                    format!("{amount} {label}")
                })
                .collect()
        })
        .unwrap_or_default();

    if matched.is_empty() {
        split_signature(Some(sig)).into_iter().map(escape_html).collect()
    } else {
        matched
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts<'a>() -> MessageParts<'a> {
        MessageParts {
            name: "SPECIAL 20G KVM",
            price_signature: Some("$49.99 USD Annually<br />$5.99 USD Monthly"),
            feature_signature: Some("SSD: 20 GB<br />Transfer: 1 TB<br />CPU: 1x"),
            purchase_link: "https://shop.test/aff.php?aff=1&pid=44",
            promo_code: None,
        }
    }

    #[test]
    fn test_new_listing_message() {
        let text = compose(Headline::NewListing, &parts());
        assert!(text.starts_with("✅ New listing - SPECIAL 20G KVM"));
        assert!(text.contains("• Disk: 20 GB"));
        assert!(text.contains("• Traffic: 1 TB"));
        assert!(text.contains("• CPU: 1x"));
        assert!(text.contains("• $49.99 USD per year"));
        assert!(text.contains("• $5.99 USD per month"));
        assert!(text.contains("🛍️ Buy: https://shop.test/aff.php?aff=1&amp;pid=44"));
        assert!(!text.contains("Promo code"));
    }

    #[test]
    fn test_restock_message_with_promo() {
        let mut p = parts();
        p.promo_code = Some("SAVE<5>");
        let text = compose(Headline::Restock, &p);
        assert!(text.starts_with("✅ Restocked"));
        assert!(text.contains("<code>SAVE&lt;5&gt;</code>"));
    }

    #[test]
    fn test_delisted_message_strikes_link() {
        let text = compose(Headline::Delisted, &parts());
        assert!(text.starts_with("❌ SPECIAL 20G KVM - delisted or sold out"));
        assert!(text.contains("<s>https://shop.test/aff.php?aff=1&amp;pid=44</s>"));
    }

    #[test]
    fn test_unparsed_price_falls_back_to_lines() {
        let mut p = parts();
        p.price_signature = Some("Contact sales<br />Custom");
        let text = compose(Headline::NewListing, &p);
        assert!(text.contains("• Contact sales"));
        assert!(text.contains("• Custom"));
    }

    #[test]
    fn test_unknown_signatures_render() {
        let mut p = parts();
        p.price_signature = None;
        p.feature_signature = None;
        let text = compose(Headline::Delisted, &p);
        assert!(text.contains("• unknown"));
    }

    #[test]
    fn test_name_and_link_are_escaped() {
        let mut p = parts();
        p.name = "R&D <beta>";
        let text = compose(Headline::NewListing, &p);
        assert!(text.starts_with("✅ New listing - R&amp;D &lt;beta&gt;"));
        assert!(!text.contains("<beta>"));
        assert!(!text.contains("aff=1&pid"));
    }
}
