//! Enforcement Sweeper
//!
//! Backstop for cookies that never passed the guard: `Set-Cookie` headers,
//! frames sharing the store, writes made before installation. Each sweep
//! deletes every visible cookie whose category is not accepted.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use consent_page::{Page, PageEvent};
use consent_patterns::Classifier;
use consent_storage::{ConsentListener, ConsentRecord, ConsentState};

use crate::domain::DomainMatrix;

const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Distinct cookie names inspected
    pub scanned: usize,
    /// Names a deletion was issued for
    pub deleted: Vec<String>,
}

pub struct Sweeper {
    page: Arc<Page>,
    state: Arc<ConsentState>,
    matrix: DomainMatrix,
    classifier: Classifier,
    sweeps: AtomicUsize,
}

impl Sweeper {
    pub fn new(page: Arc<Page>, state: Arc<ConsentState>, matrix: DomainMatrix) -> Arc<Self> {
        Arc::new(Self {
            page,
            state,
            matrix,
            classifier: Classifier::new(),
            sweeps: AtomicUsize::new(0),
        })
    }

    pub fn matrix(&self) -> DomainMatrix {
        self.matrix
    }

    /// Number of sweeps run so far
    pub fn sweep_count(&self) -> usize {
        self.sweeps.load(Ordering::Relaxed)
    }

    fn cookie_names(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.page
            .cookie()
            .split(';')
            .filter_map(|pair| pair.split_once('=').map(|(name, _)| name.trim()))
            .filter(|name| !name.is_empty())
            .filter(|name| seen.insert(name.to_string()))
            .map(str::to_string)
            .collect()
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweeps.fetch_add(1, Ordering::Relaxed);

        let names = self.cookie_names();
        let mut report = SweepReport {
            scanned: names.len(),
            deleted: Vec::new(),
        };

        for name in names {
            if name == self.state.cookie_name() {
                continue;
            }

            let Some(category) = self.classifier.classify_cookie_name(&name) else {
                continue;
            };

            if self.state.is_accepted(&category) {
                continue;
            }

            self.delete(&name);
            tracing::debug!(cookie = %name, category = %category, "Swept cookie");
            report.deleted.push(name);
        }

        if !report.deleted.is_empty() {
            let remaining = self.cookie_names();
            let survivors: Vec<&String> = report
                .deleted
                .iter()
                .filter(|name| remaining.contains(name))
                .collect();
            if !survivors.is_empty() {
                tracing::debug!(
                    ?survivors,
                    "Cookies survived deletion; set with attributes outside the matrix"
                );
            }
        }

        report
    }

    /// Expire `name` under every Domain/Path combination in the matrix
    fn delete(&self, name: &str) {
        for domain in self.matrix.domains(self.page.hostname()) {
            for path in self.matrix.paths() {
                let mut assignment = format!("{}=; Expires={}", name, EXPIRED);
                if let Some(path) = path {
                    assignment.push_str("; Path=");
                    assignment.push_str(path);
                }
                if let Some(domain) = &domain {
                    assignment.push_str("; Domain=");
                    assignment.push_str(domain);
                }
                self.page.set_cookie(&assignment);
            }
        }
    }

    /// Sweep again whenever the page becomes visible or regains focus
    pub fn register_page_triggers(self: Arc<Self>) {
        for event in [PageEvent::VisibilityChange, PageEvent::Focus] {
            let weak: Weak<Sweeper> = Arc::downgrade(&self);
            self.page.add_event_listener(
                event,
                Arc::new(move || {
                    if let Some(sweeper) = weak.upgrade() {
                        sweeper.sweep();
                    }
                }),
            );
        }
    }
}

impl ConsentListener for Sweeper {
    fn on_consent_changed(&self, _record: Option<&ConsentRecord>) {
        self.sweep();
    }
}
