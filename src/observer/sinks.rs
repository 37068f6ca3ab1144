use super::{ConnectionEvent, ConnectionObserver};
use tokio::sync::mpsc;

/// Observer that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl ConnectionObserver for NullObserver {}

/// Forwards events over an unbounded channel.
///
/// Sending never waits, so this is safe on the transport's timing path.
/// Events sent after the receiver is gone are discarded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ConnectionObserver for ChannelObserver {
    fn on_event(&self, event: &ConnectionEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Logs each event at debug level, then hands it to `inner`.
#[derive(Debug, Clone, Default)]
pub struct TracingObserver<O = NullObserver> {
    inner: O,
}

impl<O: ConnectionObserver> TracingObserver<O> {
    pub fn new(inner: O) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<O: ConnectionObserver> ConnectionObserver for TracingObserver<O> {
    fn on_event(&self, event: &ConnectionEvent) {
        tracing::debug!(
            kind = event.kind.as_str(),
            local = ?event.local_addr,
            remote = ?event.remote_addr,
            protocol = event.protocol.map(|p| p.as_str()),
            "connection event"
        );
        self.inner.on_event(event);
    }
}
