//! Resource interception capability
//!
//! An interceptor captures the page's original primitive at install time,
//! keeps it private, and puts itself in front of it. Everything the page
//! routes through the primitive then reaches `guarded_operation`.

use std::sync::Arc;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installed {
    /// This call put the interceptor in place
    Fresh,
    /// An earlier call already did; nothing changed
    AlreadyInstalled,
}

pub trait ResourceInterceptor: Send + Sync {
    type Args;
    type Output;

    /// Capture the original primitive and replace it with this interceptor.
    /// Installing twice is a no-op.
    fn install(self: Arc<Self>) -> Result<Installed>;

    fn is_installed(&self) -> bool;

    /// Decide on one intercepted call, forwarding to the original when allowed
    fn guarded_operation(&self, args: Self::Args) -> Self::Output;
}
