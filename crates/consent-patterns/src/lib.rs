//! Consentry Pattern Classifier
//!
//! Maps cookie names and script descriptors to consent categories using
//! static heuristic tables:
//! - Cookie names: anchored regexes, analytics table checked before marketing
//! - Script `src`: vendor domain/path fragments
//! - Inline scripts: lowercase call signatures (`gtag(`, `fbq(` ...)
//!
//! No match means "no category", which callers treat as necessary.

mod category;
mod classifier;

pub use category::CategoryId;
pub use classifier::{classify_cookie_name, classify_script, Classifier, ScriptDescriptor};
