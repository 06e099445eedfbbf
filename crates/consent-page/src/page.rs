//! Page: origin, cookie store, DOM and the hookable write primitives

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

use crate::cookie::{CookieAssignment, CookieChange, CookieJar};
use crate::dom::{Dom, Element, NodeId};
use crate::error::PageError;
use crate::Result;

/// The `document.cookie` setter
pub trait CookieSetter: Send + Sync {
    fn set(&self, assignment: &str);
}

/// The node insertion primitive behind `appendChild` / `insertBefore`.
/// Returns the node the caller receives back.
pub trait NodeInserter: Send + Sync {
    fn insert(&self, parent: NodeId, node: NodeId, reference: Option<NodeId>) -> Result<NodeId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageEvent {
    VisibilityChange,
    Focus,
    BodyReady,
}

pub type PageListener = Arc<dyn Fn() + Send + Sync>;

/// A script that began executing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedScript {
    pub node: NodeId,
    pub src: Option<String>,
    pub text: String,
}

struct NativeCookieSetter {
    jar: Arc<Mutex<CookieJar>>,
    host: String,
    path: String,
}

impl CookieSetter for NativeCookieSetter {
    fn set(&self, assignment: &str) {
        let parsed = CookieAssignment::parse(assignment);
        let change = self
            .jar
            .lock()
            .apply(&parsed, &self.host, &self.path, Utc::now());

        if let CookieChange::Rejected(reason) = change {
            tracing::trace!(cookie = %parsed.name, reason, "Cookie write rejected by store");
        }
    }
}

struct NativeNodeInserter {
    dom: Arc<RwLock<Dom>>,
    executed: Arc<Mutex<Vec<ExecutedScript>>>,
}

impl NodeInserter for NativeNodeInserter {
    fn insert(&self, parent: NodeId, node: NodeId, reference: Option<NodeId>) -> Result<NodeId> {
        let mut dom = self.dom.write();
        dom.insert(parent, node, reference)?;

        if !dom.is_connected(node) {
            return Ok(node);
        }

        // Live scripts entering the document run once
        for id in dom.subtree(node) {
            let element = dom.get(id)?;
            let has_payload = element.has_attribute("src") || !element.text.trim().is_empty();
            if element.is_live_script() && !element.started && has_payload {
                let script = ExecutedScript {
                    node: id,
                    src: element.attribute("src").map(str::to_string),
                    text: element.text.clone(),
                };
                dom.mark_started(id)?;
                tracing::trace!(node = %id, "Script executed");
                self.executed.lock().push(script);
            }
        }

        Ok(node)
    }
}

#[derive(Default)]
struct Hardening {
    cookie: bool,
    insertion: bool,
}

pub struct Page {
    url: Url,
    host: String,
    jar: Arc<Mutex<CookieJar>>,
    dom: Arc<RwLock<Dom>>,
    cookie_setter: RwLock<Arc<dyn CookieSetter>>,
    node_inserter: RwLock<Arc<dyn NodeInserter>>,
    hardening: RwLock<Hardening>,
    listeners: RwLock<Vec<(PageEvent, PageListener)>>,
    executed: Arc<Mutex<Vec<ExecutedScript>>>,
    reloads: AtomicUsize,
    /// Values scoped to this page, one per type
    extensions: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Page {
    /// A fully parsed page (head and body present)
    pub fn new(url: &str) -> Result<Arc<Self>> {
        let page = Self::build(url)?;
        page.dom.write().ensure_body();
        Ok(Arc::new(page))
    }

    /// A page still parsing `<head>`: no body until [`Page::mark_body_ready`]
    pub fn loading(url: &str) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::build(url)?))
    }

    /// A parsed page seeded with the `<script>` elements of `html`.
    /// Seeded live scripts count as already started; they are not logged as
    /// executed since they ran before anything could observe them.
    pub fn from_html(url: &str, html: &str) -> Result<Arc<Self>> {
        let page = Self::build(url)?;
        let document = Html::parse_document(html);

        {
            let mut dom = page.dom.write();
            let head = dom.head();
            let body = dom.ensure_body();

            for (scope, parent) in [("head script", head), ("body script", body)] {
                let selector =
                    Selector::parse(scope).map_err(|e| PageError::Html(e.to_string()))?;

                for script in document.select(&selector) {
                    let id = dom.create_element("script");
                    for (name, value) in script.value().attrs() {
                        dom.set_attribute(id, name, value)?;
                    }
                    let text: String = script.text().collect();
                    dom.set_text(id, &text)?;
                    dom.insert(parent, id, None)?;

                    if dom.get(id)?.is_live_script() {
                        dom.mark_started(id)?;
                    }
                }
            }
        }

        tracing::debug!(url = %page.url, "Seeded page from HTML");

        Ok(Arc::new(page))
    }

    fn build(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| PageError::InvalidUrl(format!("{}: {}", url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| PageError::InvalidUrl(format!("{}: missing host", url)))?
            .to_ascii_lowercase();

        let jar = Arc::new(Mutex::new(CookieJar::new()));
        let dom = Arc::new(RwLock::new(Dom::new()));
        let executed = Arc::new(Mutex::new(Vec::new()));

        let cookie_setter: Arc<dyn CookieSetter> = Arc::new(NativeCookieSetter {
            jar: Arc::clone(&jar),
            host: host.clone(),
            path: url.path().to_string(),
        });
        let node_inserter: Arc<dyn NodeInserter> = Arc::new(NativeNodeInserter {
            dom: Arc::clone(&dom),
            executed: Arc::clone(&executed),
        });

        Ok(Self {
            url,
            host,
            jar,
            dom,
            cookie_setter: RwLock::new(cookie_setter),
            node_inserter: RwLock::new(node_inserter),
            hardening: RwLock::new(Hardening::default()),
            listeners: RwLock::new(Vec::new()),
            executed,
            reloads: AtomicUsize::new(0),
            extensions: Mutex::new(HashMap::new()),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn hostname(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    // === Cookies ===

    /// `document.cookie` getter. The getter is never replaced.
    pub fn cookie(&self) -> String {
        self.jar
            .lock()
            .header_string(&self.host, self.url.path(), Utc::now())
    }

    /// `document.cookie = assignment`, through whatever setter is installed
    pub fn set_cookie(&self, assignment: &str) {
        let setter = Arc::clone(&*self.cookie_setter.read());
        setter.set(assignment);
    }

    /// A `Set-Cookie` response header: reaches the store without passing any
    /// page-level primitive
    pub fn receive_set_cookie_header(&self, header: &str) -> CookieChange {
        let parsed = CookieAssignment::parse(header);
        self.jar
            .lock()
            .apply(&parsed, &self.host, self.url.path(), Utc::now())
    }

    /// Read access to the raw store, including cookies the read view hides
    pub fn with_cookie_jar<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&CookieJar) -> T,
    {
        f(&self.jar.lock())
    }

    /// The current cookie setter, as a property descriptor read would return it
    pub fn cookie_setter(&self) -> Arc<dyn CookieSetter> {
        Arc::clone(&*self.cookie_setter.read())
    }

    pub fn define_cookie_setter(&self, setter: Arc<dyn CookieSetter>) -> Result<()> {
        if self.hardening.read().cookie {
            return Err(PageError::Hardened("document.cookie"));
        }
        *self.cookie_setter.write() = setter;
        Ok(())
    }

    pub fn harden_cookie_property(&self) {
        self.hardening.write().cookie = true;
    }

    // === DOM ===

    pub fn head(&self) -> NodeId {
        self.dom.read().head()
    }

    pub fn body(&self) -> Option<NodeId> {
        self.dom.read().body()
    }

    pub fn has_body(&self) -> bool {
        self.body().is_some()
    }

    /// Finish parsing: create `<body>` and fire [`PageEvent::BodyReady`]
    pub fn mark_body_ready(&self) {
        let created = {
            let mut dom = self.dom.write();
            let had_body = dom.body().is_some();
            dom.ensure_body();
            !had_body
        };

        if created {
            self.dispatch(PageEvent::BodyReady);
        }
    }

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.dom.write().create_element(tag)
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<()> {
        self.dom.write().set_attribute(node, name, value)
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<()> {
        self.dom.write().remove_attribute(node, name)
    }

    pub fn set_text(&self, node: NodeId, text: &str) -> Result<()> {
        self.dom.write().set_text(node, text)
    }

    pub fn element(&self, node: NodeId) -> Result<Element> {
        self.dom.read().get(node).cloned()
    }

    pub fn remove(&self, node: NodeId) -> Result<()> {
        self.dom.write().detach(node)
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.dom.read().is_connected(node)
    }

    /// Connected elements matching `predicate`, in document order
    pub fn query<F>(&self, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&Element) -> bool,
    {
        self.dom.read().find(predicate)
    }

    /// `parent.appendChild(node)`
    pub fn append_child(&self, parent: NodeId, node: NodeId) -> Result<NodeId> {
        self.insert_before(parent, node, None)
    }

    /// `parent.insertBefore(node, reference)`
    pub fn insert_before(
        &self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<NodeId> {
        let inserter = Arc::clone(&*self.node_inserter.read());
        inserter.insert(parent, node, reference)
    }

    pub fn node_inserter(&self) -> Arc<dyn NodeInserter> {
        Arc::clone(&*self.node_inserter.read())
    }

    pub fn define_node_inserter(&self, inserter: Arc<dyn NodeInserter>) -> Result<()> {
        if self.hardening.read().insertion {
            return Err(PageError::Hardened("Node.prototype.appendChild"));
        }
        *self.node_inserter.write() = inserter;
        Ok(())
    }

    pub fn harden_node_insertion(&self) {
        self.hardening.write().insertion = true;
    }

    /// Scripts that have executed since the page was created
    pub fn executed_scripts(&self) -> Vec<ExecutedScript> {
        self.executed.lock().clone()
    }

    // === Events & navigation ===

    pub fn add_event_listener(&self, event: PageEvent, listener: PageListener) {
        self.listeners.write().push((event, listener));
    }

    pub fn dispatch(&self, event: PageEvent) {
        let listeners: Vec<PageListener> = self
            .listeners
            .read()
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, l)| Arc::clone(l))
            .collect();

        tracing::trace!(?event, listeners = listeners.len(), "Dispatching page event");

        for listener in listeners {
            listener();
        }
    }

    /// `location.reload()`; recorded, since the page model has no navigation
    pub fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(url = %self.url, "Page reload requested");
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    // === Page-scoped values ===

    /// The page's value of type `T`, created with `init` on first request.
    /// The flag is true when this call created it.
    pub fn extension_or_insert_with<T, F>(&self, init: F) -> (Arc<T>, bool)
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Arc<T>,
    {
        let mut extensions = self.extensions.lock();

        if let Some(existing) = extensions.get(&TypeId::of::<T>()) {
            if let Ok(value) = Arc::clone(existing).downcast::<T>() {
                return (value, false);
            }
        }

        let value = init();
        extensions.insert(TypeId::of::<T>(), Arc::clone(&value) as Arc<dyn Any + Send + Sync>);
        (value, true)
    }

    pub fn extension<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let extensions = self.extensions.lock();
        let existing = extensions.get(&TypeId::of::<T>())?;
        Arc::clone(existing).downcast::<T>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct DroppingSetter;

    impl CookieSetter for DroppingSetter {
        fn set(&self, _assignment: &str) {}
    }

    #[test]
    fn test_native_cookie_roundtrip() {
        let page = Page::new("https://www.example.com/").unwrap();
        page.set_cookie("session=abc; path=/");
        assert_eq!(page.cookie(), "session=abc");
    }

    #[test]
    fn test_replace_cookie_setter() {
        let page = Page::new("https://www.example.com/").unwrap();
        page.define_cookie_setter(Arc::new(DroppingSetter)).unwrap();
        page.set_cookie("session=abc; path=/");
        assert_eq!(page.cookie(), "");

        // Headers bypass the page primitive
        page.receive_set_cookie_header("srv=1; Path=/");
        assert_eq!(page.cookie(), "srv=1");
    }

    #[test]
    fn test_hardened_properties() {
        let page = Page::new("https://www.example.com/").unwrap();
        page.harden_cookie_property();
        page.harden_node_insertion();

        assert!(matches!(
            page.define_cookie_setter(Arc::new(DroppingSetter)),
            Err(PageError::Hardened(_))
        ));
        let native = page.node_inserter();
        assert!(page.define_node_inserter(native).is_err());
    }

    #[test]
    fn test_live_scripts_execute_once() {
        let page = Page::new("https://www.example.com/").unwrap();
        let head = page.head();

        let script = page.create_element("script");
        page.set_attribute(script, "src", "https://cdn.example.com/app.js")
            .unwrap();
        page.append_child(head, script).unwrap();
        page.remove(script).unwrap();
        page.append_child(head, script).unwrap();

        let inert = page.create_element("script");
        page.set_attribute(inert, "type", "text/plain").unwrap();
        page.set_text(inert, "console.log(1)").unwrap();
        page.append_child(head, inert).unwrap();

        let executed = page.executed_scripts();
        assert_eq!(executed.len(), 1);
        assert_eq!(
            executed[0].src.as_deref(),
            Some("https://cdn.example.com/app.js")
        );
    }

    #[test]
    fn test_from_html() {
        let html = r#"<html><head>
            <script src="/cookie-consent-standalone.js"></script>
            <script type="text/plain" data-category="analytics">gtag('js', new Date());</script>
        </head><body><script>console.log('app')</script></body></html>"#;

        let page = Page::from_html("https://shop.example.com/", html).unwrap();
        let scripts = page.query(|e| e.is_script());
        assert_eq!(scripts.len(), 3);

        let placeholder = page.element(scripts[1]).unwrap();
        assert_eq!(placeholder.attribute("data-category"), Some("analytics"));
        assert!(placeholder.text.contains("gtag("));
        assert!(page.executed_scripts().is_empty());
    }

    #[test]
    fn test_body_ready_event() {
        let page = Page::loading("https://www.example.com/").unwrap();
        assert!(!page.has_body());

        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        page.add_event_listener(
            PageEvent::BodyReady,
            Arc::new(move || flag.store(true, Ordering::SeqCst)),
        );

        page.mark_body_ready();
        assert!(page.has_body());
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_extension_created_once() {
        let page = Page::new("https://www.example.com/").unwrap();
        assert!(page.extension::<AtomicUsize>().is_none());

        let (first, created) = page.extension_or_insert_with(|| Arc::new(AtomicUsize::new(7)));
        assert!(created);

        let (second, created) = page.extension_or_insert_with(|| Arc::new(AtomicUsize::new(0)));
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.load(Ordering::SeqCst), 7);
        assert!(page.extension::<AtomicUsize>().is_some());
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            Page::new("not a url"),
            Err(PageError::InvalidUrl(_))
        ));
    }
}
