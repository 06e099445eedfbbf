//! Consent manager
//!
//! Owns the engine for one page: state, store, guard, gate and sweeper.
//! All consent transitions go through here and are fully reconciled before
//! the call returns.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

use consent_enforcement::{
    BlockedScript, CookieGuard, Installed, ResourceInterceptor, ScriptGate, SweepReport,
    SweepSchedule, Sweeper,
};
use consent_page::{Page, PageEvent};
use consent_patterns::CategoryId;
use consent_storage::{
    CategoryDefinition, ConsentRecord, ConsentState, EnforcementMode, PreferenceStore,
};

use crate::config::ConsentConfig;
use crate::presenter::Presenter;
use crate::Result;

/// Consent engine bound to one page
pub struct ConsentManager {
    config: ConsentConfig,
    page: Arc<Page>,
    state: Arc<ConsentState>,
    store: PreferenceStore,
    guard: Arc<CookieGuard>,
    gate: Arc<ScriptGate>,
    sweeper: Arc<Sweeper>,
    presenter: Arc<dyn Presenter>,
    /// Periodic sweep task; lives as long as the runtime
    sweep_task: Mutex<Option<JoinHandle<()>>>,
    banner_visible: AtomicBool,
    preferences_visible: AtomicBool,
}

impl ConsentManager {
    /// Validate the configuration and bring the engine up on `page`.
    ///
    /// Interceptors that cannot be installed degrade enforcement instead of
    /// failing init: without the guard, sweeps are the only cookie
    /// enforcement; without the gate, placeholders still activate.
    pub fn init(
        page: Arc<Page>,
        config: ConsentConfig,
        presenter: Arc<dyn Presenter>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        // State, guard and gate are shared with any earlier init on this
        // page, so each primitive is wrapped at most once
        let state = ConsentState::for_page(&page, config.store_settings());

        let (guard, _) =
            page.extension_or_insert_with(|| CookieGuard::new(&page, Arc::clone(&state)));
        match Arc::clone(&guard).install() {
            Ok(Installed::Fresh) => {}
            Ok(Installed::AlreadyInstalled) => {
                tracing::debug!("Cookie guard already installed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cookie guard unavailable, falling back to sweep-only enforcement");
                state.set_enforcement_mode(EnforcementMode::SweepOnly);
            }
        }

        let (gate, _) = page.extension_or_insert_with(|| {
            ScriptGate::new(&page, Arc::clone(&state), config.gate_settings())
        });
        match Arc::clone(&gate).install() {
            Ok(Installed::Fresh) => {}
            Ok(Installed::AlreadyInstalled) => {
                tracing::debug!("Script gate already installed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Script gate unavailable, dynamic scripts will not be blocked");
            }
        }

        let sweeper = Sweeper::new(Arc::clone(&page), Arc::clone(&state), config.domain_matrix);

        let store = PreferenceStore::new(Arc::clone(&page), Arc::clone(&state));
        store.subscribe(sweeper.clone());
        store.subscribe(gate.clone());

        let manager = Arc::new(Self {
            config,
            page,
            state,
            store,
            guard,
            gate,
            sweeper,
            presenter,
            sweep_task: Mutex::new(None),
            banner_visible: AtomicBool::new(false),
            preferences_visible: AtomicBool::new(false),
        });

        // Cookies set before the guard existed are swept even without a
        // record; placeholders wait for one
        if manager.store.load().is_some() {
            manager.enforce();
        } else {
            manager.sweeper.sweep();
        }

        Arc::clone(&manager.sweeper).register_page_triggers();
        manager.start_periodic_sweeps();

        if manager.config.auto_show_banner && !manager.state.has_consent() {
            if manager.page.has_body() {
                manager.show_banner();
            } else {
                Self::show_banner_when_body_ready(&manager);
            }
        }

        tracing::info!(
            host = %manager.page.hostname(),
            mode = ?manager.state.enforcement_mode(),
            has_consent = manager.state.has_consent(),
            "Consent manager initialized"
        );

        Ok(manager)
    }

    fn start_periodic_sweeps(&self) {
        let schedule = SweepSchedule::new(self.config.sweep_interval());
        match schedule.spawn(Arc::clone(&self.sweeper)) {
            Some(task) => *self.sweep_task.lock() = Some(task),
            None => tracing::info!("No async runtime available, periodic sweeps disabled"),
        }
    }

    fn show_banner_when_body_ready(manager: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(manager);
        manager.page.add_event_listener(
            PageEvent::BodyReady,
            Arc::new(move || {
                if let Some(manager) = weak.upgrade() {
                    if !manager.state.has_consent() {
                        manager.show_banner();
                    }
                }
            }),
        );
    }

    // === Accessors ===

    pub fn config(&self) -> &ConsentConfig {
        &self.config
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    pub fn state(&self) -> &Arc<ConsentState> {
        &self.state
    }

    pub fn guard(&self) -> &Arc<CookieGuard> {
        &self.guard
    }

    pub fn gate(&self) -> &Arc<ScriptGate> {
        &self.gate
    }

    pub fn enforcement_mode(&self) -> EnforcementMode {
        self.state.enforcement_mode()
    }

    pub fn has_periodic_sweeps(&self) -> bool {
        self.sweep_task.lock().is_some()
    }

    pub fn blocked_scripts(&self) -> Vec<BlockedScript> {
        self.gate.blocked_scripts()
    }

    pub fn current_preferences(&self) -> Option<ConsentRecord> {
        self.state.preferences()
    }

    fn categories(&self) -> Vec<CategoryDefinition> {
        self.state.settings().categories.values().cloned().collect()
    }

    // === Consent transitions ===

    /// Accept every configured category
    pub fn accept_all(&self) -> Result<ConsentRecord> {
        let categories = self.state.settings().all_categories();
        self.commit(categories)
    }

    /// Keep only the read-only categories
    pub fn reject_all(&self) -> Result<ConsentRecord> {
        let categories = self.state.settings().read_only_categories();
        self.commit(categories)
    }

    /// Save a choice made in the preferences dialog. Read-only categories
    /// are always included; ids that are not configured are ignored.
    pub fn save_selection<I>(&self, selected: I) -> Result<ConsentRecord>
    where
        I: IntoIterator<Item = CategoryId>,
    {
        let settings = self.state.settings();
        let mut categories = settings.read_only_categories();

        for id in selected {
            if settings.categories.contains_key(&id) {
                categories.insert(id);
            } else {
                tracing::debug!(category = %id, "Ignoring unknown category in selection");
            }
        }

        self.commit(categories)
    }

    fn commit(&self, categories: BTreeSet<CategoryId>) -> Result<ConsentRecord> {
        let record = self.store.save(ConsentRecord::now(categories))?;

        self.hide_preferences_ui();
        self.hide_banner();

        if self.config.reload_after_change {
            self.page.reload();
        }

        Ok(record)
    }

    /// Forget the stored choice and ask again
    pub fn reset_consent(&self) -> bool {
        self.store.clear();

        if self.config.auto_show_banner {
            return self.show_banner();
        }
        true
    }

    /// Reconcile the page with the current consent: activate gated scripts
    /// and sweep
    pub fn enforce(&self) -> SweepReport {
        let activated = self.gate.activate_gated_scripts();
        let report = self.sweeper.sweep();

        tracing::debug!(
            activated,
            deleted = report.deleted.len(),
            "Enforced consent preferences"
        );

        report
    }

    pub fn sweep_now(&self) -> SweepReport {
        self.sweeper.sweep()
    }

    // === Presentation ===

    fn body_ready(&self, operation: &str) -> bool {
        if self.page.has_body() {
            return true;
        }
        tracing::error!(
            operation,
            "document.body not ready; call after DOMContentLoaded"
        );
        false
    }

    pub fn show_banner(&self) -> bool {
        if !self.body_ready("show_banner") {
            return false;
        }
        self.presenter.show_banner(self.config.appearance());
        self.banner_visible.store(true, Ordering::SeqCst);
        true
    }

    pub fn hide_banner(&self) {
        if self.banner_visible.swap(false, Ordering::SeqCst) {
            self.presenter.hide_banner();
        }
    }

    pub fn is_banner_visible(&self) -> bool {
        self.banner_visible.load(Ordering::SeqCst)
    }

    pub fn show_preferences_ui(&self) -> bool {
        if !self.body_ready("show_preferences_ui") {
            return false;
        }
        let current = self.state.preferences();
        self.presenter
            .show_preferences(&self.categories(), current.as_ref());
        self.preferences_visible.store(true, Ordering::SeqCst);
        true
    }

    pub fn hide_preferences_ui(&self) {
        if self.preferences_visible.swap(false, Ordering::SeqCst) {
            self.presenter.hide_preferences();
        }
    }

    pub fn is_preferences_visible(&self) -> bool {
        self.preferences_visible.load(Ordering::SeqCst)
    }

    /// Banner while no choice exists, the preferences dialog afterwards
    pub fn show(&self) -> bool {
        if self.state.has_consent() {
            self.show_preferences_ui()
        } else {
            self.show_banner()
        }
    }
}
