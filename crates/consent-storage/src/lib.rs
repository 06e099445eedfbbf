//! Consentry Storage Layer
//!
//! The consent cookie is the single source of truth for consent. This crate
//! reads and writes it, keeps the in-memory copy every enforcement component
//! consults, and fans consent changes out to listeners.

mod error;
mod record;
mod state;
mod store;

pub use error::StorageError;
pub use record::{CategoryDefinition, ConsentRecord};
pub use state::{ConsentState, EnforcementMode, StoreSettings};
pub use store::{ConsentListener, PreferenceStore};

pub type Result<T> = std::result::Result<T, StorageError>;
