//! Consentry Enforcement
//!
//! Three layers keep non-consented tracking off the page:
//! - [`CookieGuard`]: wraps the cookie setter and drops classified writes
//! - [`ScriptGate`]: wraps node insertion and neutralizes classified scripts;
//!   activates author-marked placeholders once their category is accepted
//! - [`Sweeper`]: deletes classified cookies that got in anyway (headers,
//!   frames, writes made before the guard existed)
//!
//! Guard and gate are [`ResourceInterceptor`]s. Installation returns an
//! explicit result; the caller decides how to degrade.

mod domain;
mod error;
mod gate;
mod guard;
mod interceptor;
mod schedule;
mod sweeper;

pub use domain::{registrable_domain, DomainMatrix};
pub use error::InstallationFailure;
pub use gate::{BlockedScript, GateSettings, InsertRequest, ScriptGate};
pub use guard::{CookieDecision, CookieGuard};
pub use interceptor::{Installed, ResourceInterceptor};
pub use schedule::{SweepSchedule, DEFAULT_SWEEP_INTERVAL};
pub use sweeper::{SweepReport, Sweeper};

pub type Result<T> = std::result::Result<T, InstallationFailure>;
