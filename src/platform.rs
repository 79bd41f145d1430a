//! Injected host-platform collaborator.
//!
//! The original extension helper is a page-global object; here it is a trait
//! passed into the facade at construction so tests can substitute a fake.
//! The platform calls *into* the relay through the `on_*` lifecycle methods
//! on [`crate::proxy::GameProxy`]; the relay calls *out* through this trait.

use std::fmt::Debug;

/// Actions the relay invokes on the host platform.
pub trait HostPlatform: Debug + Send + Sync {
    /// Asks the platform to prompt the viewer to share their identity with
    /// the extension. A grant arrives later as a fresh authorization
    /// callback carrying updated claims.
    fn request_id_share(&self);
}

/// Platform stub that ignores every action.
///
/// Useful for hosted test pages and unit tests that never exercise the
/// identity flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPlatform;

impl HostPlatform for NoopPlatform {
    fn request_id_share(&self) {
        tracing::debug!("id share requested on noop platform");
    }
}
