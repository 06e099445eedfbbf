//! Script Gate
//!
//! Two authoring patterns are handled:
//! - placeholders written by the site author
//!   (`<script type="text/plain" data-category="analytics">`), rewritten into
//!   live scripts once their category is accepted
//! - scripts inserted at runtime by other code, intercepted at node
//!   insertion and neutralized when classified and not accepted
//!
//! Blocked dynamic insertions are never re-run. A reload is needed for that.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock, Weak};

use consent_page::{Element, NodeId, NodeInserter, Page, PageError};
use consent_patterns::{CategoryId, Classifier, ScriptDescriptor};
use consent_storage::{ConsentListener, ConsentRecord, ConsentState};

use crate::error::InstallationFailure;
use crate::interceptor::{Installed, ResourceInterceptor};
use crate::Result;

const BLOCKED_LOG_CAPACITY: usize = 50;

/// Attribute names and markers the gate recognizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Names the category of a placeholder
    pub category_attribute: String,
    /// `type` value that keeps a placeholder from executing
    pub inert_type: String,
    /// Scripts carrying this attribute are never blocked
    pub allow_attribute: String,
    /// Scripts whose `src` contains this path are never blocked
    pub self_script_path: String,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            category_attribute: "data-category".to_string(),
            inert_type: "text/plain".to_string(),
            allow_attribute: "data-cc-allow".to_string(),
            self_script_path: "cookie-consent-standalone.js".to_string(),
        }
    }
}

/// Arguments of one intercepted `appendChild` / `insertBefore`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertRequest {
    pub parent: NodeId,
    pub node: NodeId,
    pub reference: Option<NodeId>,
}

/// Diagnostic entry for a neutralized insertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedScript {
    pub node: NodeId,
    pub descriptor: ScriptDescriptor,
    pub category: CategoryId,
    pub at: DateTime<Utc>,
}

pub struct ScriptGate {
    /// Weak: the page owns the gate once it is installed
    page: Weak<Page>,
    state: Arc<ConsentState>,
    settings: GateSettings,
    classifier: Classifier,
    original: OnceLock<Arc<dyn NodeInserter>>,
    blocked: Mutex<VecDeque<BlockedScript>>,
}

impl ScriptGate {
    pub fn new(page: &Arc<Page>, state: Arc<ConsentState>, settings: GateSettings) -> Arc<Self> {
        Arc::new(Self {
            page: Arc::downgrade(page),
            state,
            settings,
            classifier: Classifier::new(),
            original: OnceLock::new(),
            blocked: Mutex::new(VecDeque::with_capacity(BLOCKED_LOG_CAPACITY)),
        })
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    fn page(&self) -> consent_page::Result<Arc<Page>> {
        self.page.upgrade().ok_or(PageError::Closed)
    }

    fn is_placeholder(&self, element: &Element) -> bool {
        element.is_script()
            && element.has_attribute(&self.settings.category_attribute)
            && element
                .attribute("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case(&self.settings.inert_type))
    }

    fn is_exempt(&self, element: &Element) -> bool {
        if element.has_attribute(&self.settings.allow_attribute) {
            return true;
        }

        let own_script = element
            .attribute("src")
            .is_some_and(|src| src.contains(&self.settings.self_script_path));

        own_script || self.is_placeholder(element)
    }

    fn descriptor(element: &Element) -> ScriptDescriptor {
        match element.attribute("src").filter(|s| !s.is_empty()) {
            Some(src) => ScriptDescriptor::external(src),
            None => ScriptDescriptor::inline(element.text.clone()),
        }
    }

    /// Category that keeps `element` from being inserted, if any
    pub fn blocking_category(&self, element: &Element) -> Option<CategoryId> {
        if !element.is_live_script() || self.is_exempt(element) {
            return None;
        }

        self.classifier
            .classify_script(&Self::descriptor(element))
            .filter(|category| !self.state.is_accepted(category))
    }

    fn insert_unguarded(
        &self,
        page: &Page,
        parent: NodeId,
        node: NodeId,
    ) -> consent_page::Result<NodeId> {
        match self.original.get() {
            Some(original) => original.insert(parent, node, None),
            None => page.append_child(parent, node),
        }
    }

    /// Rewrite every connected placeholder whose category is accepted into a
    /// live script in `<head>` and drop the placeholder. Returns how many
    /// were activated.
    pub fn activate_gated_scripts(&self) -> usize {
        let Ok(page) = self.page() else {
            tracing::debug!("Page closed, no gated scripts to activate");
            return 0;
        };

        let placeholders = page.query(|element| self.is_placeholder(element));
        let mut activated = 0;

        for placeholder in placeholders {
            match self.activate(&page, placeholder) {
                Ok(true) => activated += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(node = %placeholder, error = %e, "Failed to activate gated script");
                }
            }
        }

        if activated > 0 {
            tracing::info!(count = activated, "Activated gated scripts");
        }

        activated
    }

    fn activate(&self, page: &Page, placeholder: NodeId) -> consent_page::Result<bool> {
        let element = page.element(placeholder)?;
        let Some(category) = element.attribute(&self.settings.category_attribute) else {
            return Ok(false);
        };
        if !self.state.is_accepted(&CategoryId::new(category)) {
            return Ok(false);
        }

        let script = page.create_element("script");
        for (name, value) in &element.attributes {
            if name.eq_ignore_ascii_case(&self.settings.category_attribute)
                || name.eq_ignore_ascii_case("type")
            {
                continue;
            }
            page.set_attribute(script, name, value)?;
        }
        page.set_text(script, &element.text)?;

        self.insert_unguarded(page, page.head(), script)?;
        page.remove(placeholder)?;

        tracing::debug!(
            placeholder = %placeholder,
            script = %script,
            category = %category,
            "Gated script activated"
        );

        Ok(true)
    }

    /// Most recent neutralized insertions, oldest first
    pub fn blocked_scripts(&self) -> Vec<BlockedScript> {
        self.blocked.lock().iter().cloned().collect()
    }

    fn record_blocked(&self, entry: BlockedScript) {
        let mut log = self.blocked.lock();
        if log.len() == BLOCKED_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(entry);
    }
}

impl ResourceInterceptor for ScriptGate {
    type Args = InsertRequest;
    type Output = consent_page::Result<NodeId>;

    fn install(self: Arc<Self>) -> Result<Installed> {
        if self.state.gate_installed() {
            return Ok(Installed::AlreadyInstalled);
        }

        let page = self.page.upgrade().ok_or(InstallationFailure::PageClosed)?;

        let original = page.node_inserter();
        let _ = self.original.set(original);

        let wrapper: Arc<dyn NodeInserter> = Arc::clone(&self) as Arc<dyn NodeInserter>;
        page.define_node_inserter(wrapper)
            .map_err(InstallationFailure::NodeInsertionLocked)?;

        self.state.mark_gate_installed();

        tracing::info!(host = %page.hostname(), "Script gate installed");

        Ok(Installed::Fresh)
    }

    fn is_installed(&self) -> bool {
        self.state.gate_installed()
    }

    fn guarded_operation(&self, request: InsertRequest) -> consent_page::Result<NodeId> {
        let page = self.page()?;
        let element = page.element(request.node)?;

        if let Some(category) = self.blocking_category(&element) {
            // Strip the payload so a later re-insert cannot run it either
            page.set_text(request.node, "")?;

            let stand_in = page.create_element("div");
            page.set_attribute(stand_in, "style", "display: none")?;

            let descriptor = Self::descriptor(&element);
            tracing::debug!(
                script = %descriptor.label(),
                category = %category,
                "Blocked script insertion"
            );
            self.record_blocked(BlockedScript {
                node: request.node,
                descriptor,
                category,
                at: Utc::now(),
            });

            return Ok(stand_in);
        }

        match self.original.get() {
            Some(original) => original.insert(request.parent, request.node, request.reference),
            None => Err(PageError::Hardened("Node.prototype.appendChild")),
        }
    }
}

impl NodeInserter for ScriptGate {
    fn insert(
        &self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> consent_page::Result<NodeId> {
        self.guarded_operation(InsertRequest {
            parent,
            node,
            reference,
        })
    }
}

impl ConsentListener for ScriptGate {
    fn on_consent_changed(&self, record: Option<&ConsentRecord>) {
        if record.is_some() {
            self.activate_gated_scripts();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consent_storage::{PreferenceStore, StoreSettings};

    const PAGE: &str = r#"<html><head>
        <script src="/cookie-consent-standalone.js"></script>
        <script type="text/plain" data-category="analytics" src="https://www.googletagmanager.com/gtag/js?id=G-1" async></script>
        <script type="text/plain" data-category="marketing">fbq('init', '1');</script>
        </head><body></body></html>"#;

    fn setup() -> (Arc<Page>, Arc<ConsentState>, Arc<ScriptGate>) {
        let page = Page::from_html("https://www.example.com/", PAGE).unwrap();
        let state = ConsentState::new(StoreSettings::default());
        let gate = ScriptGate::new(&page, Arc::clone(&state), GateSettings::default());
        (page, state, gate)
    }

    fn script(page: &Page, src: Option<&str>, text: &str) -> NodeId {
        let node = page.create_element("script");
        if let Some(src) = src {
            page.set_attribute(node, "src", src).unwrap();
        }
        page.set_text(node, text).unwrap();
        node
    }

    #[test]
    fn test_blocks_tracking_insertions() {
        let (page, _state, gate) = setup();
        gate.clone().install().unwrap();

        let body = page.body().unwrap();
        let ga = script(&page, Some("https://www.google-analytics.com/analytics.js"), "");
        let returned = page.append_child(body, ga).unwrap();

        assert_ne!(returned, ga);
        assert_eq!(page.element(returned).unwrap().tag, "div");
        assert!(!page.is_connected(ga));
        assert!(page.executed_scripts().is_empty());

        let pixel = script(&page, None, "fbq('track', 'PageView');");
        page.append_child(body, pixel).unwrap();
        assert_eq!(page.element(pixel).unwrap().text, "");

        let blocked = gate.blocked_scripts();
        assert_eq!(blocked.len(), 2);
        assert_eq!(blocked[0].category, CategoryId::analytics());
        assert_eq!(blocked[1].category, CategoryId::marketing());
    }

    #[test]
    fn test_passes_other_nodes() {
        let (page, _state, gate) = setup();
        gate.clone().install().unwrap();
        let body = page.body().unwrap();

        let div = page.create_element("div");
        assert_eq!(page.append_child(body, div).unwrap(), div);

        let app = script(&page, Some("/static/app.js"), "");
        assert_eq!(page.append_child(body, app).unwrap(), app);

        let allowed = script(&page, Some("https://connect.facebook.net/en_US/fbevents.js"), "");
        page.set_attribute(allowed, "data-cc-allow", "").unwrap();
        assert_eq!(page.append_child(body, allowed).unwrap(), allowed);

        assert_eq!(page.executed_scripts().len(), 2);
        assert!(gate.blocked_scripts().is_empty());
    }

    #[test]
    fn test_accepted_category_inserts() {
        let (page, state, gate) = setup();
        gate.clone().install().unwrap();
        let store = PreferenceStore::new(Arc::clone(&page), state);
        store
            .save(ConsentRecord::now(["necessary", "analytics"]))
            .unwrap();

        let ga = script(&page, Some("https://www.googletagmanager.com/gtm.js"), "");
        assert_eq!(page.append_child(page.head(), ga).unwrap(), ga);
        assert_eq!(page.executed_scripts().len(), 1);
    }

    #[test]
    fn test_activation_follows_acceptance() {
        let (page, state, gate) = setup();
        gate.clone().install().unwrap();
        let store = PreferenceStore::new(Arc::clone(&page), Arc::clone(&state));
        store.subscribe(gate.clone());

        assert_eq!(gate.activate_gated_scripts(), 0);

        store
            .save(ConsentRecord::now(["necessary", "analytics"]))
            .unwrap();

        let executed = page.executed_scripts();
        assert_eq!(executed.len(), 1);
        assert_eq!(
            executed[0].src.as_deref(),
            Some("https://www.googletagmanager.com/gtag/js?id=G-1")
        );

        let live = page.element(executed[0].node).unwrap();
        assert!(live.has_attribute("async"));
        assert!(!live.has_attribute("data-category"));
        assert!(!live.has_attribute("type"));

        // Marketing placeholder still waiting
        let remaining = page.query(|e| e.has_attribute("data-category"));
        assert_eq!(remaining.len(), 1);

        store
            .save(ConsentRecord::now(["necessary", "analytics", "marketing"]))
            .unwrap();
        let executed = page.executed_scripts();
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[1].text, "fbq('init', '1');");
        assert!(page.query(|e| e.has_attribute("data-category")).is_empty());
    }

    #[test]
    fn test_activation_without_gate_installed() {
        let (page, state, gate) = setup();
        page.harden_node_insertion();
        assert!(matches!(
            gate.clone().install(),
            Err(InstallationFailure::NodeInsertionLocked(_))
        ));

        let store = PreferenceStore::new(Arc::clone(&page), state);
        store
            .save(ConsentRecord::now(["necessary", "marketing"]))
            .unwrap();
        assert_eq!(gate.activate_gated_scripts(), 1);
        assert_eq!(page.executed_scripts().len(), 1);
    }

    #[test]
    fn test_blocked_log_is_bounded() {
        let (page, _state, gate) = setup();
        gate.clone().install().unwrap();
        let body = page.body().unwrap();

        for i in 0..(BLOCKED_LOG_CAPACITY + 5) {
            let node = script(&page, Some(&format!("https://www.google-analytics.com/ga.js?v={}", i)), "");
            page.append_child(body, node).unwrap();
        }

        let blocked = gate.blocked_scripts();
        assert_eq!(blocked.len(), BLOCKED_LOG_CAPACITY);
        assert!(blocked[0].descriptor.label().ends_with("v=5"));
    }

    #[test]
    fn test_installed_gate_does_not_keep_page_alive() {
        let (page, _state, gate) = setup();
        gate.clone().install().unwrap();

        let weak = Arc::downgrade(&page);
        drop(page);
        assert!(weak.upgrade().is_none());
        assert_eq!(gate.activate_gated_scripts(), 0);
    }

    #[test]
    fn test_double_install() {
        let (_page, _state, gate) = setup();
        assert_eq!(gate.clone().install().unwrap(), Installed::Fresh);
        assert_eq!(gate.clone().install().unwrap(), Installed::AlreadyInstalled);
        assert!(gate.is_installed());
    }
}
