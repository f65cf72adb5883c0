//! Typed equality filters over the indexed payload fields.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use docrag_core::error::{Error, Result};
use docrag_core::types::{keys, Metadata};

/// Payload fields every collection keeps an equality index on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexedField {
    Product,
    Type,
}

impl IndexedField {
    pub const ALL: [IndexedField; 2] = [IndexedField::Product, IndexedField::Type];

    pub fn payload_key(self) -> &'static str {
        match self {
            IndexedField::Product => keys::PRODUCT,
            IndexedField::Type => keys::TYPE,
        }
    }

    /// Extract this field's value from a payload, if it is a string.
    pub fn value_of(self, payload: &Metadata) -> Option<&str> {
        payload.get(self.payload_key()).and_then(|v| v.as_str())
    }
}

impl fmt::Display for IndexedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload_key())
    }
}

impl FromStr for IndexedField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "product" => Ok(IndexedField::Product),
            "type" => Ok(IndexedField::Type),
            other => Err(Error::config(format!(
                "unknown filter field {other:?}; indexed fields are product, type"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: IndexedField,
    pub value: String,
}

/// Conjunction of equality conditions. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    conditions: Vec<FieldFilter>,
}

impl Filter {
    pub fn new() -> Self { Self::default() }

    pub fn and(mut self, field: IndexedField, value: impl Into<String>) -> Self {
        self.conditions.push(FieldFilter { field, value: value.into() });
        self
    }

    /// Parse untyped `(field, value)` pairs; unknown fields are a configuration error.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut filter = Filter::new();
        for (k, v) in pairs {
            filter = filter.and(k.as_ref().parse()?, v);
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool { self.conditions.is_empty() }

    pub fn conditions(&self) -> &[FieldFilter] { &self.conditions }

    pub fn matches(&self, payload: &Metadata) -> bool {
        self.conditions.iter().all(|c| c.field.value_of(payload) == Some(c.value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn unknown_field_is_rejected() {
        let err = Filter::from_pairs([("category", "x")]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn all_conditions_must_hold() {
        let filter = Filter::from_pairs([("product", "RCP"), ("type", "qa")]).expect("filter");
        let mut payload = Metadata::new();
        payload.insert(keys::PRODUCT.into(), Value::from("RCP"));
        assert!(!filter.matches(&payload));
        payload.insert(keys::TYPE.into(), Value::from("qa"));
        assert!(filter.matches(&payload));
        assert!(Filter::new().matches(&Metadata::new()));
    }
}
