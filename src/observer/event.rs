use crate::http::Protocol;
use std::net::SocketAddr;
use std::time::Instant;

/// Connection setup milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The transport is about to open a socket to `remote_addr`.
    DialStarted,
    /// The path to the peer is up: TCP connect finished, or the first QUIC
    /// datagram from the peer arrived.
    Connected,
    /// TLS (or the QUIC crypto handshake) completed; `protocol` is set.
    HandshakeDone,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DialStarted => "dial_started",
            EventKind::Connected => "connected",
            EventKind::HandshakeDone => "handshake_done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub kind: EventKind,
    pub local_addr: Option<SocketAddr>,
    pub remote_addr: Option<SocketAddr>,
    pub protocol: Option<Protocol>,
    pub timestamp: Instant,
}

impl ConnectionEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            local_addr: None,
            remote_addr: None,
            protocol: None,
            timestamp: Instant::now(),
        }
    }

    pub fn dial_started(remote: SocketAddr) -> Self {
        Self::new(EventKind::DialStarted).remote(remote)
    }

    pub fn connected(local: Option<SocketAddr>, remote: SocketAddr) -> Self {
        let mut event = Self::new(EventKind::Connected).remote(remote);
        event.local_addr = local;
        event
    }

    pub fn handshake_done(remote: SocketAddr, protocol: Protocol) -> Self {
        let mut event = Self::new(EventKind::HandshakeDone).remote(remote);
        event.protocol = Some(protocol);
        event
    }

    fn remote(mut self, remote: SocketAddr) -> Self {
        self.remote_addr = Some(remote);
        self
    }
}
