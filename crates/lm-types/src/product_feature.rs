use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// The textual key `product.feature` (e.g. `abaqus.standard`) that agents, parsers and
/// CLIs speak. The ledger resolves it to a `(product_id, config_id, name)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProductFeature(String);

fn pattern() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+$").unwrap())
}

impl ProductFeature {
    pub fn product(&self) -> &str {
        self.0.split_once('.').expect("validated on construction").0
    }

    pub fn feature(&self) -> &str {
        self.0.split_once('.').expect("validated on construction").1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for ProductFeature {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if pattern().is_match(value) {
            Ok(ProductFeature(value.to_string()))
        } else {
            Err(format!("'{value}' is not a valid product.feature key"))
        }
    }
}

impl TryFrom<String> for ProductFeature {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if pattern().is_match(&value) {
            Ok(ProductFeature(value))
        } else {
            Err(format!("'{value}' is not a valid product.feature key"))
        }
    }
}

impl<'de> Deserialize<'de> for ProductFeature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ProductFeature::try_from(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dotted_key() {
        let pf = ProductFeature::try_from("abaqus.standard").unwrap();
        assert_eq!(pf.product(), "abaqus");
        assert_eq!(pf.feature(), "standard");
    }

    #[test]
    fn rejects_missing_dot() {
        assert!(ProductFeature::try_from("abaqus").is_err());
    }

    #[test]
    fn rejects_bad_characters() {
        assert!(ProductFeature::try_from("abaqus.standard!").is_err());
        assert!(ProductFeature::try_from("abaqus .standard").is_err());
    }

    #[test]
    fn deserializes_from_json_string() {
        let pf: ProductFeature = serde_json::from_str("\"p.X\"").unwrap();
        assert_eq!(pf.as_str(), "p.X");
    }

    #[test]
    fn rejects_two_dots() {
        // two dots is still accepted as long as both sides match the charset around
        // the *first* split; the backend only ever splits once.
        let pf = ProductFeature::try_from("a.b.c");
        assert!(pf.is_err(), "dots beyond the first are not part of the charset");
    }
}
