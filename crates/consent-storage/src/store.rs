//! Preference store
//!
//! Reads and writes the consent cookie. `save` and `clear` notify every
//! subscribed listener synchronously before returning, so callers observe a
//! fully reconciled page as soon as the call completes.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

use consent_page::Page;

use crate::record::ConsentRecord;
use crate::state::ConsentState;
use crate::Result;

const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Reacts to consent transitions (sweeps, script activation)
pub trait ConsentListener: Send + Sync {
    fn on_consent_changed(&self, record: Option<&ConsentRecord>);
}

pub struct PreferenceStore {
    page: Arc<Page>,
    state: Arc<ConsentState>,
    listeners: RwLock<Vec<Arc<dyn ConsentListener>>>,
}

impl PreferenceStore {
    pub fn new(page: Arc<Page>, state: Arc<ConsentState>) -> Self {
        Self {
            page,
            state,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> &Arc<ConsentState> {
        &self.state
    }

    pub fn subscribe(&self, listener: Arc<dyn ConsentListener>) {
        self.listeners.write().push(listener);
    }

    /// Load the stored choice into the cache. Missing or malformed cookies
    /// yield `None`.
    pub fn load(&self) -> Option<ConsentRecord> {
        let record = self.read_cookie().map(|record| self.normalize(record));
        self.state.set_preferences(record.clone());
        record
    }

    fn read_cookie(&self) -> Option<ConsentRecord> {
        let cookie_name = self.state.cookie_name();
        let header = self.page.cookie();

        let value = header.split("; ").find_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            (name.trim() == cookie_name).then_some(value)
        })?;

        match ConsentRecord::decode(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(cookie = %cookie_name, error = %e, "Ignoring unreadable consent cookie");
                None
            }
        }
    }

    /// Read-only categories are part of every record
    fn normalize(&self, mut record: ConsentRecord) -> ConsentRecord {
        record
            .categories
            .extend(self.state.settings().read_only_categories());
        record
    }

    /// Persist a new choice, replacing the previous one, then reconcile
    pub fn save(&self, record: ConsentRecord) -> Result<ConsentRecord> {
        let record = self.normalize(record);
        let settings = self.state.settings();

        let expiry_days = i64::from(settings.cookie_expiry_days);
        let expires = Utc::now()
            .checked_add_signed(Duration::days(expiry_days))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let assignment = format!(
            "{}={}; Expires={}; Max-Age={}; Path=/; SameSite=Lax",
            settings.cookie_name,
            record.encode()?,
            expires.format("%a, %d %b %Y %H:%M:%S GMT"),
            expiry_days * 24 * 60 * 60,
        );

        self.page.set_cookie(&assignment);
        self.state.set_preferences(Some(record.clone()));

        tracing::info!(
            categories = ?record.categories,
            timestamp = record.timestamp,
            "Saved consent preferences"
        );

        self.notify(Some(&record));
        Ok(record)
    }

    /// Forget the stored choice
    pub fn clear(&self) {
        let assignment = format!(
            "{}=; Expires={}; Path=/",
            self.state.cookie_name(),
            EXPIRED
        );
        self.page.set_cookie(&assignment);
        self.state.set_preferences(None);

        tracing::info!("Cleared consent preferences");

        self.notify(None);
    }

    fn notify(&self, record: Option<&ConsentRecord>) {
        let listeners: Vec<Arc<dyn ConsentListener>> =
            self.listeners.read().iter().cloned().collect();
        for listener in listeners {
            listener.on_consent_changed(record);
        }
    }
}
