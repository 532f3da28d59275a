//! Computed style snapshots

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(-?\d+)").expect("static regex"));

/// Computed style properties of one element, keyed by CSS property name
/// (`max-width`, `margin-left`, ...). Read once, compared, discarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleSnapshot {
    properties: BTreeMap<String, String>,
}

impl StyleSnapshot {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Leading integer value of a property (`"16.5px"` -> 16.0).
    /// Keywords such as `none` or `auto` yield `None`.
    pub fn px(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(parse_px)
    }

    /// Horizontal margins are identical, which is how a block centered with
    /// `margin: 0 auto` reports itself.
    pub fn margins_equal(&self) -> bool {
        match (self.get("margin-left"), self.get("margin-right")) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parse the leading number of a CSS length, truncated to whole pixels
pub fn parse_px(value: &str) -> Option<f64> {
    LEADING_NUMBER
        .captures(value)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("16px", Some(16.0))]
    #[test_case("1140.5px", Some(1140.0))]
    #[test_case("31.99px", Some(31.0))]
    #[test_case("-8px", Some(-8.0))]
    #[test_case("0px", Some(0.0))]
    #[test_case("none", None)]
    #[test_case("auto", None)]
    fn test_parse_px(input: &str, expected: Option<f64>) {
        assert_eq!(parse_px(input), expected);
    }

    #[test]
    fn test_margins_equal() {
        let centered = StyleSnapshot::from_pairs([("margin-left", "64px"), ("margin-right", "64px")]);
        assert!(centered.margins_equal());

        let skewed = StyleSnapshot::from_pairs([("margin-left", "0px"), ("margin-right", "64px")]);
        assert!(!skewed.margins_equal());

        let missing = StyleSnapshot::from_pairs([("margin-left", "0px")]);
        assert!(!missing.margins_equal());
    }

    #[test]
    fn test_deserialize_transparent_map() {
        let snap: StyleSnapshot =
            serde_json::from_str(r#"{"max-width": "768px", "padding-left": "16px"}"#).unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.px("max-width"), Some(768.0));
        assert_eq!(snap.get("padding-left"), Some("16px"));
    }
}
