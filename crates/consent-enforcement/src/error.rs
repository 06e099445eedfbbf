//! Installation failure types

use consent_page::PageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstallationFailure {
    #[error("Cookie property cannot be intercepted: {0}")]
    CookiePropertyLocked(#[source] PageError),

    #[error("Node insertion cannot be intercepted: {0}")]
    NodeInsertionLocked(#[source] PageError),

    #[error("Page closed before installation")]
    PageClosed,
}
