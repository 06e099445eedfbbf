//! Consent category identifiers

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Join key between configured categories, classifier output and
/// `data-category` markers on gated scripts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(String);

impl CategoryId {
    pub const NECESSARY: &'static str = "necessary";
    pub const ANALYTICS: &'static str = "analytics";
    pub const MARKETING: &'static str = "marketing";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn necessary() -> Self {
        Self::new(Self::NECESSARY)
    }

    pub fn analytics() -> Self {
        Self::new(Self::ANALYTICS)
    }

    pub fn marketing() -> Self {
        Self::new(Self::MARKETING)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CategoryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for CategoryId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CategoryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&CategoryId::analytics()).unwrap();
        assert_eq!(json, "\"analytics\"");

        let parsed: CategoryId = serde_json::from_str("\"marketing\"").unwrap();
        assert_eq!(parsed, CategoryId::marketing());
    }
}
