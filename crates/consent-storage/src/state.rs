//! Process-wide consent state
//!
//! Lifecycle:
//! - created once per page from the first settings seen, and attached to
//!   the page so every later init on it shares one state
//! - mutated by the preference store (cached record) and by enforcement
//!   installation (installed flags, enforcement mode)
//! - dropped with the page; a fresh page load starts from nothing
//!
//! Every component receives this object explicitly instead of reaching for
//! globals.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use consent_page::Page;
use consent_patterns::CategoryId;

use crate::record::{CategoryDefinition, ConsentRecord};

/// Settings the store and the enforcement components share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub cookie_name: String,
    pub cookie_expiry_days: u32,
    pub categories: BTreeMap<CategoryId, CategoryDefinition>,
}

impl StoreSettings {
    pub fn read_only_categories(&self) -> BTreeSet<CategoryId> {
        self.categories
            .values()
            .filter(|c| c.read_only)
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn all_categories(&self) -> BTreeSet<CategoryId> {
        self.categories.keys().cloned().collect()
    }

    pub fn is_read_only(&self, category: &CategoryId) -> bool {
        self.categories.get(category).is_some_and(|c| c.read_only)
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        let categories = [
            CategoryDefinition::new(
                CategoryId::NECESSARY,
                "Necessary",
                "Essential cookies required for the website to function properly.",
            )
            .read_only(),
            CategoryDefinition::new(
                CategoryId::ANALYTICS,
                "Analytics",
                "Help us understand how visitors interact with our website.",
            ),
            CategoryDefinition::new(
                CategoryId::MARKETING,
                "Marketing",
                "Used to deliver personalized content and ads.",
            ),
        ]
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();

        Self {
            cookie_name: "cc_cookie".to_string(),
            cookie_expiry_days: 365,
            categories,
        }
    }
}

/// How cookie writes are being policed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Cookie writes pass through the guard
    Intercepting,
    /// The guard could not be installed; only sweeps remove cookies
    SweepOnly,
}

pub struct ConsentState {
    settings: StoreSettings,
    preferences: RwLock<Option<ConsentRecord>>,
    guard_installed: AtomicBool,
    gate_installed: AtomicBool,
    mode: RwLock<EnforcementMode>,
}

impl ConsentState {
    pub fn new(settings: StoreSettings) -> Arc<Self> {
        Arc::new(Self {
            settings,
            preferences: RwLock::new(None),
            guard_installed: AtomicBool::new(false),
            gate_installed: AtomicBool::new(false),
            mode: RwLock::new(EnforcementMode::SweepOnly),
        })
    }

    /// The state attached to `page`, created from `settings` if the page has
    /// none yet. An existing state keeps its own settings.
    pub fn for_page(page: &Page, settings: StoreSettings) -> Arc<Self> {
        let mut requested = Some(settings);
        let (state, created) = page.extension_or_insert_with(|| {
            Self::new(requested.take().unwrap_or_default())
        });

        if !created {
            if requested.as_ref().is_some_and(|s| *s != state.settings) {
                tracing::warn!(
                    host = %page.hostname(),
                    "Consent state already attached to page, ignoring new settings"
                );
            } else {
                tracing::debug!(host = %page.hostname(), "Reusing page consent state");
            }
        }

        state
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn cookie_name(&self) -> &str {
        &self.settings.cookie_name
    }

    /// Cached consent record, `None` until the user has chosen
    pub fn preferences(&self) -> Option<ConsentRecord> {
        self.preferences.read().clone()
    }

    pub(crate) fn set_preferences(&self, record: Option<ConsentRecord>) {
        *self.preferences.write() = record;
    }

    pub fn has_consent(&self) -> bool {
        self.preferences.read().is_some()
    }

    /// Read-only categories are always accepted. Anything else needs a
    /// record that names it; with no record it is blocked.
    pub fn is_accepted(&self, category: &CategoryId) -> bool {
        if self.settings.is_read_only(category) {
            return true;
        }

        self.preferences
            .read()
            .as_ref()
            .is_some_and(|record| record.accepts(category))
    }

    /// Whether something classified as `category` may proceed.
    /// Unclassified resources are always allowed.
    pub fn allows(&self, category: Option<&CategoryId>) -> bool {
        category.map_or(true, |c| self.is_accepted(c))
    }

    /// Record the guard as installed; false if it already was
    pub fn mark_guard_installed(&self) -> bool {
        !self.guard_installed.swap(true, Ordering::SeqCst)
    }

    pub fn guard_installed(&self) -> bool {
        self.guard_installed.load(Ordering::SeqCst)
    }

    /// Record the gate as installed; false if it already was
    pub fn mark_gate_installed(&self) -> bool {
        !self.gate_installed.swap(true, Ordering::SeqCst)
    }

    pub fn gate_installed(&self) -> bool {
        self.gate_installed.load(Ordering::SeqCst)
    }

    pub fn enforcement_mode(&self) -> EnforcementMode {
        *self.mode.read()
    }

    pub fn set_enforcement_mode(&self, mode: EnforcementMode) {
        let previous = std::mem::replace(&mut *self.mode.write(), mode);
        if previous != mode {
            tracing::info!(?previous, ?mode, "Enforcement mode changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_closed_without_record() {
        let state = ConsentState::new(StoreSettings::default());

        assert!(!state.has_consent());
        assert!(state.is_accepted(&CategoryId::necessary()));
        assert!(!state.is_accepted(&CategoryId::analytics()));
        assert!(!state.allows(Some(&CategoryId::marketing())));
        assert!(state.allows(None));
    }

    #[test]
    fn test_record_drives_acceptance() {
        let state = ConsentState::new(StoreSettings::default());
        state.set_preferences(Some(ConsentRecord::new(["necessary", "analytics"], 1)));

        assert!(state.is_accepted(&CategoryId::analytics()));
        assert!(!state.is_accepted(&CategoryId::marketing()));
    }

    #[test]
    fn test_install_flags() {
        let state = ConsentState::new(StoreSettings::default());
        assert!(state.mark_guard_installed());
        assert!(!state.mark_guard_installed());
        assert!(state.guard_installed());
        assert!(!state.gate_installed());
    }

    #[test]
    fn test_state_shared_per_page() {
        let page = Page::new("https://www.example.com/").unwrap();
        let first = ConsentState::for_page(&page, StoreSettings::default());
        first.mark_guard_installed();

        let other_settings = StoreSettings {
            cookie_name: "other".to_string(),
            ..StoreSettings::default()
        };
        let second = ConsentState::for_page(&page, other_settings);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.guard_installed());
        assert_eq!(second.cookie_name(), "cc_cookie");

        let elsewhere = Page::new("https://www.example.com/").unwrap();
        assert!(!ConsentState::for_page(&elsewhere, StoreSettings::default()).guard_installed());
    }

    #[test]
    fn test_default_settings() {
        let settings = StoreSettings::default();
        assert_eq!(settings.cookie_name, "cc_cookie");
        assert_eq!(
            settings.read_only_categories(),
            BTreeSet::from([CategoryId::necessary()])
        );
        assert_eq!(settings.all_categories().len(), 3);
    }
}
