//! Normalized outcome of one request.

use crate::base::neterror::{ErrorKind, NetError};
use crate::http::altsvc::AltService;
use crate::http::Protocol;
use http::StatusCode;
use std::net::SocketAddr;
use std::time::Duration;

/// Connection setup milestones, measured from the start of the dial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectTiming {
    /// Name resolution finished.
    pub resolved: Duration,
    /// TCP connect finished, or the first QUIC datagram arrived.
    pub connected: Duration,
    /// TLS / QUIC handshake finished. `None` for cleartext TCP.
    pub handshake_done: Option<Duration>,
}

/// Per-request timing, similar in spirit to Chromium's `LoadTimingInfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadTiming {
    /// Present only when this request dialed a new connection.
    pub connect: Option<ConnectTiming>,
    /// Time from request start until response headers were decoded.
    pub headers_received: Option<Duration>,
    /// Time from request start until the body was fully read or the
    /// request failed.
    pub total: Duration,
}

/// Result of [`HttpClient::send`](crate::client::HttpClient::send).
///
/// On failure before headers arrive, `error` is set and `status` is `None`.
/// A truncated body keeps the status but carries `IncompleteResponse`.
#[derive(Debug, Clone, Default)]
pub struct RequestResult {
    pub status: Option<StatusCode>,
    pub protocol: Option<Protocol>,
    pub remote_addr: Option<SocketAddr>,
    /// Whether a pooled connection served the request.
    pub reused: bool,
    pub timing: LoadTiming,
    pub alt_svc: Vec<AltService>,
    pub body_len: usize,
    pub error: Option<NetError>,
}

impl RequestResult {
    pub fn failed(error: NetError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_some()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(NetError::kind)
    }

    /// `"200 OK"` style status line text.
    pub fn status_text(&self) -> Option<String> {
        self.status.map(|s| match s.canonical_reason() {
            Some(reason) => format!("{} {}", s.as_u16(), reason),
            None => s.as_u16().to_string(),
        })
    }

    /// The protocol name as reported to callers (`h1`, `h2`, `h3`).
    pub fn negotiated_protocol(&self) -> Option<&'static str> {
        self.protocol.map(|p| p.as_str())
    }

    /// First advertised HTTP/3 alternative, if any.
    pub fn h3_alternative(&self) -> Option<&AltService> {
        self.alt_svc.iter().find(|s| s.is_h3())
    }
}
