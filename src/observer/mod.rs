//! Connection lifecycle observation.
//!
//! Transports report setup milestones as [`ConnectionEvent`]s to a single
//! [`ConnectionObserver`] per request. Observers run synchronously on the
//! dial path and must return quickly: record, forward, never wait.
//!
//! - [`NullObserver`]: ignores everything
//! - [`ChannelObserver`]: forwards events to an unbounded channel
//! - [`TracingObserver`]: logs each event and delegates to an inner observer

mod event;
mod sinks;

pub use event::{ConnectionEvent, EventKind};
pub use sinks::{ChannelObserver, NullObserver, TracingObserver};

/// A passive sink for connection lifecycle events.
///
/// The default method body does nothing, so implementors only override
/// what they need.
pub trait ConnectionObserver: Send + Sync {
    fn on_event(&self, _event: &ConnectionEvent) {}
}

impl<O: ConnectionObserver + ?Sized> ConnectionObserver for &O {
    fn on_event(&self, event: &ConnectionEvent) {
        (**self).on_event(event)
    }
}

impl<O: ConnectionObserver + ?Sized> ConnectionObserver for std::sync::Arc<O> {
    fn on_event(&self, event: &ConnectionEvent) {
        (**self).on_event(event)
    }
}
