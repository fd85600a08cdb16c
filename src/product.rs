//! Product identity and persisted product state.
//!
//! A product is identified by the page it was observed on plus its
//! canonical name. Exactly one [`ProductRecord`] exists per [`ProductKey`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Delimiter between source and name in the string form of a key.
pub const KEY_DELIMITER: &str = "::";

/// Stable product identity: `(source, canonical name)`.
///
/// The name never contains [`KEY_DELIMITER`]. Sources that are not
/// [`is_keyable_source`] are rejected when the config is loaded, so the first
/// delimiter in the string form always ends the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductKey {
    source: String,
    name: String,
}

impl ProductKey {
    /// Builds a key, replacing any delimiter occurrence inside the name.
    pub fn new(source: impl Into<String>, name: &str) -> Self {
        Self {
            source: source.into(),
            name: collapse_delimiters(name),
        }
    }

    /// The monitored URL this product was observed on.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The canonical product name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if this key belongs to `source`.
    #[must_use]
    pub fn belongs_to(&self, source: &str) -> bool {
        self.source == source
    }
}

/// True if `source` can be used as the source half of a [`ProductKey`].
///
/// A trailing `:` would merge with the delimiter and shift the split point
/// when the key is read back.
#[must_use]
pub fn is_keyable_source(source: &str) -> bool {
    !source.is_empty() && !source.contains(KEY_DELIMITER) && !source.ends_with(':')
}

fn collapse_delimiters(name: &str) -> String {
    let mut name = name.to_string();
    while name.contains(KEY_DELIMITER) {
        name = name.replace(KEY_DELIMITER, ":");
    }
    name
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_DELIMITER}{}", self.source, self.name)
    }
}

/// Error returned when a string is not a valid `source::name` key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid product key '{0}'")]
pub struct InvalidProductKey(pub String);

impl FromStr for ProductKey {
    type Err = InvalidProductKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(KEY_DELIMITER) {
            Some((source, name)) if !source.is_empty() => Ok(Self {
                source: source.to_string(),
                name: name.to_string(),
            }),
            _ => Err(InvalidProductKey(s.to_string())),
        }
    }
}

impl Serialize for ProductKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProductKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Identifier of a notification channel (e.g. a chat id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle of a sent message, used to edit it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHandle(pub i64);

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted state of one product.
///
/// Signatures are `None` only for products that have never been seen in
/// stock; such records serialize the signature as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Normalized price text.
    #[serde(rename = "price")]
    pub price_signature: Option<String>,
    /// Normalized, filtered feature text.
    #[serde(rename = "features")]
    pub feature_signature: Option<String>,
    /// Last known purchase URL (affiliate-tagged when configured).
    #[serde(rename = "link")]
    pub purchase_link: String,
    /// Current known availability.
    pub out_of_stock: bool,
    /// Channel id -> live message for this product.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub message_handles: BTreeMap<ChannelId, MessageHandle>,
}

impl ProductRecord {
    /// True once the product has been observed in stock at least once.
    #[must_use]
    pub fn has_known_signatures(&self) -> bool {
        self.price_signature.is_some() && self.feature_signature.is_some()
    }

    /// True if at least one channel still holds a message for this product.
    #[must_use]
    pub fn has_live_message(&self) -> bool {
        !self.message_handles.is_empty()
    }
}
