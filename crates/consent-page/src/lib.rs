//! Consentry Host Page
//!
//! The page the consent engine runs against. It owns the two resources the
//! engine polices, the cookie store and the live DOM, and exposes the write
//! paths into them as replaceable primitives:
//! - `document.cookie` setter → [`CookieSetter`]
//! - `appendChild` / `insertBefore` → [`NodeInserter`]
//!
//! Either primitive can be hardened, in which case redefinition fails the
//! way a frozen property does in a locked-down browser.

mod cookie;
mod dom;
mod error;
mod page;

pub use cookie::{CookieAssignment, CookieChange, CookieJar, StoredCookie};
pub use dom::{is_executable_script_type, Dom, Element, NodeId};
pub use error::PageError;
pub use page::{CookieSetter, ExecutedScript, NodeInserter, Page, PageEvent, PageListener};

pub type Result<T> = std::result::Result<T, PageError>;
