//! Consent record and category definitions

use chrono::Utc;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use consent_patterns::CategoryId;

use crate::error::StorageError;
use crate::Result;

/// Characters `encodeURIComponent` leaves alone
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A user's consent choice. Present category = accepted, absent = rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// Older widget versions stored this list under `accepted`
    #[serde(alias = "accepted")]
    pub categories: BTreeSet<CategoryId>,
    /// Epoch milliseconds
    #[serde(default)]
    pub timestamp: i64,
}

impl ConsentRecord {
    pub fn new<I, C>(categories: I, timestamp: i64) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<CategoryId>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            timestamp,
        }
    }

    /// Record stamped with the current time
    pub fn now<I, C>(categories: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<CategoryId>,
    {
        Self::new(categories, Utc::now().timestamp_millis())
    }

    pub fn accepts(&self, category: &CategoryId) -> bool {
        self.categories.contains(category)
    }

    /// Cookie value: percent-encoded JSON
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(utf8_percent_encode(&json, URI_COMPONENT).to_string())
    }

    /// Decode a cookie value. Accepts encoded and raw JSON.
    pub fn decode(value: &str) -> Result<Self> {
        let json = percent_decode_str(value)
            .decode_utf8()
            .map_err(|_| StorageError::Encoding)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// One configurable consent category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDefinition {
    pub id: CategoryId,
    /// State shown before any consent is given
    #[serde(default)]
    pub enabled: bool,
    /// Always accepted, never user-togglable
    #[serde(default)]
    pub read_only: bool,
    #[serde(default, alias = "name")]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

impl CategoryDefinition {
    pub fn new(id: impl Into<CategoryId>, display_name: &str, description: &str) -> Self {
        Self {
            id: id.into(),
            enabled: false,
            read_only: false,
            display_name: display_name.to_string(),
            description: description.to_string(),
        }
    }

    /// Mark as always-on
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self.enabled = true;
        self
    }
}
