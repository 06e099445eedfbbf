//! Presentation seam
//!
//! The banner and the preferences dialog are drawn by whoever embeds the
//! core. The manager only tells the presenter what to show.

use parking_lot::Mutex;
use serde::Serialize;

use consent_patterns::CategoryId;
use consent_storage::{CategoryDefinition, ConsentRecord};

use crate::config::Appearance;

pub trait Presenter: Send + Sync {
    fn show_banner(&self, appearance: Appearance);
    fn hide_banner(&self);
    fn show_preferences(&self, categories: &[CategoryDefinition], current: Option<&ConsentRecord>);
    fn hide_preferences(&self);
}

/// Headless embedding: nothing is drawn
#[derive(Debug, Default)]
pub struct NoopPresenter;

impl Presenter for NoopPresenter {
    fn show_banner(&self, _appearance: Appearance) {}
    fn hide_banner(&self) {}
    fn show_preferences(&self, _categories: &[CategoryDefinition], _current: Option<&ConsentRecord>) {}
    fn hide_preferences(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PresenterEvent {
    BannerShown(Appearance),
    BannerHidden,
    PreferencesShown {
        categories: Vec<CategoryId>,
        accepted: Vec<CategoryId>,
    },
    PreferencesHidden,
}

/// Keeps every presentation request, in order
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<PresenterEvent>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PresenterEvent> {
        self.events.lock().clone()
    }

    pub fn banner_shown_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, PresenterEvent::BannerShown(_)))
            .count()
    }
}

impl Presenter for RecordingPresenter {
    fn show_banner(&self, appearance: Appearance) {
        self.events.lock().push(PresenterEvent::BannerShown(appearance));
    }

    fn hide_banner(&self) {
        self.events.lock().push(PresenterEvent::BannerHidden);
    }

    fn show_preferences(&self, categories: &[CategoryDefinition], current: Option<&ConsentRecord>) {
        let accepted = current
            .map(|record| record.categories.iter().cloned().collect())
            .unwrap_or_default();
        self.events.lock().push(PresenterEvent::PreferencesShown {
            categories: categories.iter().map(|c| c.id.clone()).collect(),
            accepted,
        });
    }

    fn hide_preferences(&self) {
        self.events.lock().push(PresenterEvent::PreferencesHidden);
    }
}
