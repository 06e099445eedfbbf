//! Cookie Guard
//!
//! Sits in front of the page's cookie setter. Writes of classified cookies
//! whose category is not accepted are dropped silently; the caller cannot
//! tell the difference from a successful write.
//!
//! The guard never reads `document.cookie` to make a decision. Consent comes
//! from the cached state, so the store's own writes and the sweeper's
//! deletions can flow back through the wrapped setter without recursion.

use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use consent_page::{CookieAssignment, CookieSetter, Page};
use consent_patterns::{CategoryId, Classifier};
use consent_storage::{ConsentState, EnforcementMode};

use crate::error::InstallationFailure;
use crate::interceptor::{Installed, ResourceInterceptor};
use crate::Result;

/// What the guard did with one write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieDecision {
    /// The consent cookie itself
    ConsentCookie,
    /// Expiring writes only ever remove state
    Deletion,
    /// No classification matched
    Unclassified,
    /// Classified, and the category is accepted
    Accepted(CategoryId),
    /// Classified and not accepted: dropped
    Blocked(CategoryId),
}

impl CookieDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, CookieDecision::Blocked(_))
    }
}

pub struct CookieGuard {
    /// Weak: the page owns the guard once it is installed
    page: Weak<Page>,
    state: Arc<ConsentState>,
    classifier: Classifier,
    original: OnceLock<Arc<dyn CookieSetter>>,
    blocked: AtomicUsize,
}

impl CookieGuard {
    pub fn new(page: &Arc<Page>, state: Arc<ConsentState>) -> Arc<Self> {
        Arc::new(Self {
            page: Arc::downgrade(page),
            state,
            classifier: Classifier::new(),
            original: OnceLock::new(),
            blocked: AtomicUsize::new(0),
        })
    }

    /// Decide on an assignment without performing it
    pub fn decide(&self, assignment: &str) -> CookieDecision {
        let parsed = CookieAssignment::parse(assignment);
        let name = parsed.name.as_str();

        if name == self.state.cookie_name() {
            return CookieDecision::ConsentCookie;
        }

        if parsed.is_deletion(Utc::now()) {
            return CookieDecision::Deletion;
        }

        match self.classifier.classify_cookie_name(name) {
            None => CookieDecision::Unclassified,
            Some(category) if self.state.is_accepted(&category) => {
                CookieDecision::Accepted(category)
            }
            Some(category) => CookieDecision::Blocked(category),
        }
    }

    /// Number of writes dropped since installation
    pub fn blocked_count(&self) -> usize {
        self.blocked.load(Ordering::Relaxed)
    }
}

impl ResourceInterceptor for CookieGuard {
    type Args = String;
    type Output = CookieDecision;

    fn install(self: Arc<Self>) -> Result<Installed> {
        if self.state.guard_installed() {
            return Ok(Installed::AlreadyInstalled);
        }

        let page = self.page.upgrade().ok_or(InstallationFailure::PageClosed)?;

        let original = page.cookie_setter();
        let _ = self.original.set(original);

        let wrapper: Arc<dyn CookieSetter> = Arc::clone(&self) as Arc<dyn CookieSetter>;
        page.define_cookie_setter(wrapper)
            .map_err(InstallationFailure::CookiePropertyLocked)?;

        self.state.mark_guard_installed();
        self.state
            .set_enforcement_mode(EnforcementMode::Intercepting);

        tracing::info!(host = %page.hostname(), "Cookie guard installed");

        Ok(Installed::Fresh)
    }

    fn is_installed(&self) -> bool {
        self.state.guard_installed()
    }

    fn guarded_operation(&self, assignment: String) -> CookieDecision {
        let decision = self.decide(&assignment);

        if let CookieDecision::Blocked(category) = &decision {
            self.blocked.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                cookie = %CookieAssignment::name_of(&assignment),
                category = %category,
                "Blocked cookie write"
            );
            return decision;
        }

        if let Some(original) = self.original.get() {
            original.set(&assignment);
        }

        decision
    }
}

impl CookieSetter for CookieGuard {
    fn set(&self, assignment: &str) {
        self.guarded_operation(assignment.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consent_storage::{ConsentRecord, PreferenceStore, StoreSettings};

    fn setup() -> (Arc<Page>, Arc<ConsentState>, Arc<CookieGuard>) {
        let page = Page::new("https://www.example.com/").unwrap();
        let state = ConsentState::new(StoreSettings::default());
        let guard = CookieGuard::new(&page, Arc::clone(&state));
        (page, state, guard)
    }

    #[test]
    fn test_blocks_before_consent() {
        let (page, _state, guard) = setup();
        assert_eq!(guard.clone().install().unwrap(), Installed::Fresh);

        page.set_cookie("_ga=GA1.2.123; path=/");
        page.set_cookie("_fbp=fb.1.2; path=/");
        page.set_cookie("PHPSESSID=abc; path=/");

        assert_eq!(page.cookie(), "PHPSESSID=abc");
        assert_eq!(guard.blocked_count(), 2);
    }

    #[test]
    fn test_consent_cookie_always_passes() {
        let (page, state, guard) = setup();
        guard.clone().install().unwrap();

        let store = PreferenceStore::new(Arc::clone(&page), state);
        store.save(ConsentRecord::now(["necessary"])).unwrap();
        assert!(page.cookie().starts_with("cc_cookie="));
    }

    #[test]
    fn test_accepted_category_passes() {
        let (page, state, guard) = setup();
        guard.clone().install().unwrap();

        let store = PreferenceStore::new(Arc::clone(&page), state);
        store
            .save(ConsentRecord::now(["necessary", "marketing"]))
            .unwrap();

        page.set_cookie("_fbp=xyz; path=/");
        page.set_cookie("_gid=abc; path=/");

        let cookies = page.cookie();
        assert!(cookies.contains("_fbp=xyz"));
        assert!(!cookies.contains("_gid"));
    }

    #[test]
    fn test_deletions_pass() {
        let (page, _state, guard) = setup();
        page.set_cookie("_ga=1; path=/");
        guard.clone().install().unwrap();

        assert_eq!(
            guard.decide("_ga=; path=/; expires=Thu, 01 Jan 1970 00:00:00 GMT"),
            CookieDecision::Deletion
        );
        page.set_cookie("_ga=; path=/; expires=Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(page.cookie(), "");
    }

    #[test]
    fn test_install_is_idempotent() {
        let (page, state, guard) = setup();
        assert_eq!(guard.clone().install().unwrap(), Installed::Fresh);
        assert_eq!(guard.clone().install().unwrap(), Installed::AlreadyInstalled);

        // A second guard over the same state sees the same flag
        let other = CookieGuard::new(&page, state);
        assert_eq!(other.install().unwrap(), Installed::AlreadyInstalled);

        page.set_cookie("_ga=1; path=/");
        assert_eq!(guard.blocked_count(), 1);
    }

    #[test]
    fn test_installed_guard_does_not_keep_page_alive() {
        let (page, _state, guard) = setup();
        guard.clone().install().unwrap();

        let weak = Arc::downgrade(&page);
        drop(page);
        assert!(weak.upgrade().is_none());

        let late = CookieGuard::new(
            &Page::new("https://www.example.com/").unwrap(),
            ConsentState::new(StoreSettings::default()),
        );
        assert!(matches!(late.install(), Err(InstallationFailure::PageClosed)));
    }

    #[test]
    fn test_install_fails_on_hardened_page() {
        let (page, state, guard) = setup();
        page.harden_cookie_property();

        assert!(matches!(
            guard.clone().install(),
            Err(InstallationFailure::CookiePropertyLocked(_))
        ));
        assert!(!guard.is_installed());
        assert_eq!(state.enforcement_mode(), EnforcementMode::SweepOnly);

        // Page keeps working with the native setter
        page.set_cookie("_ga=1; path=/");
        assert_eq!(page.cookie(), "_ga=1");
    }
}
