//! Consentry Core
//!
//! Coordination layer for the consent engine: configuration, the init
//! sequence, and the programmatic API an embedding page calls.
//! Consent lives in one cookie; everything else is derived from it.

mod config;
mod error;
mod manager;
mod presenter;

pub use config::{Appearance, BannerPosition, CategoryOptions, ConsentConfig, Theme};
pub use error::CoreError;
pub use manager::ConsentManager;
pub use presenter::{NoopPresenter, Presenter, PresenterEvent, RecordingPresenter};

// Re-export the engine components
pub use consent_enforcement::{
    BlockedScript, CookieDecision, CookieGuard, DomainMatrix, InstallationFailure, Installed,
    ResourceInterceptor, ScriptGate, SweepReport, SweepSchedule, Sweeper,
};
pub use consent_page::{Page, PageError, PageEvent};
pub use consent_patterns::{CategoryId, Classifier, ScriptDescriptor};
pub use consent_storage::{
    CategoryDefinition, ConsentRecord, ConsentState, EnforcementMode, PreferenceStore,
    StorageError,
};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
