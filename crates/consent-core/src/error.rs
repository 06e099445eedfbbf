//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] consent_storage::StorageError),

    #[error("Page error: {0}")]
    Page(#[from] consent_page::PageError),

    #[error("Installation failed: {0}")]
    Installation(#[from] consent_enforcement::InstallationFailure),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
