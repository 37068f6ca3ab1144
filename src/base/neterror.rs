use serde::Serialize;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Coarse failure classes reported to callers of the request driver.
///
/// Every [`NetError`] maps onto exactly one kind via [`NetError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    UnsupportedScheme,
    DialFailed,
    HandshakeFailed,
    Cancelled,
    IncompleteResponse,
    NilResponse,
    /// The peer violated HTTP or QUIC framing after the connection was up.
    ProtocolError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::UnsupportedScheme => "unsupported_scheme",
            ErrorKind::DialFailed => "dial_failed",
            ErrorKind::HandshakeFailed => "handshake_failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::IncompleteResponse => "incomplete_response",
            ErrorKind::NilResponse => "nil_response",
            ErrorKind::ProtocolError => "protocol_error",
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum NetError {
    // Request lifecycle
    #[error("Request aborted")]
    Aborted,
    #[error("Operation timed out")]
    TimedOut,

    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("Address invalid")]
    AddressInvalid,
    #[error("Address unreachable")]
    AddressUnreachable,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("ALPN negotiation failed")]
    AlpnNegotiationFailed,
    #[error("Address in use")]
    AddressInUse,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Unknown URL scheme")]
    UnknownUrlScheme,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Empty response")]
    EmptyResponse,
    #[error("HTTP/2 protocol error")]
    Http2ProtocolError,
    #[error("Content-Length mismatch")]
    ContentLengthMismatch,
    #[error("Incomplete chunked encoding")]
    IncompleteChunkedEncoding,
    #[error("QUIC protocol error")]
    QuicProtocolError,
    #[error("Response headers truncated")]
    ResponseHeadersTruncated,
    #[error("QUIC handshake failed")]
    QuicHandshakeFailed,
    #[error("Response body truncated")]
    ResponseBodyTruncated,
    #[error("Response body exceeds the configured limit")]
    ResponseBodyTooLarge,

    // Context-rich variants
    #[error("Connection to {host}:{port} failed: {source}")]
    ConnectionFailedTo {
        host: String,
        port: u16,
        source: Arc<io::Error>,
    },
    #[error("Could not resolve {domain}: {source}")]
    NameNotResolvedFor {
        domain: String,
        source: Arc<io::Error>,
    },
    #[error("TLS handshake with {host} failed: {reason}")]
    SslHandshakeFailedFor { host: String, reason: String },
    #[error("QUIC handshake with {peer} failed: {reason}")]
    QuicHandshakeFailedFor { peer: String, reason: String },
    #[error("Scheme {scheme:?} is not supported by this transport")]
    UnsupportedSchemeFor { scheme: String },

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    /// Wrap an IO error raised while connecting to `host:port`.
    pub fn connection_failed_to(host: &str, port: u16, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            io::ErrorKind::AddrInUse => NetError::AddressInUse,
            io::ErrorKind::AddrNotAvailable => NetError::AddressInvalid,
            _ => NetError::ConnectionFailedTo {
                host: host.to_string(),
                port,
                source: Arc::new(err),
            },
        }
    }

    /// Wrap an IO error raised while resolving `domain`.
    pub fn dns_failed(domain: &str, err: io::Error) -> Self {
        NetError::NameNotResolvedFor {
            domain: domain.to_string(),
            source: Arc::new(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            NetError::InvalidUrl => ErrorKind::InvalidUrl,
            NetError::UnknownUrlScheme | NetError::UnsupportedSchemeFor { .. } => {
                ErrorKind::UnsupportedScheme
            }
            NetError::Aborted | NetError::TimedOut => ErrorKind::Cancelled,
            NetError::ConnectionClosed
            | NetError::ConnectionReset
            | NetError::ConnectionRefused
            | NetError::ConnectionFailed
            | NetError::NameNotResolved
            | NetError::AddressInvalid
            | NetError::AddressUnreachable
            | NetError::ConnectionTimedOut
            | NetError::AddressInUse
            | NetError::ConnectionFailedTo { .. }
            | NetError::NameNotResolvedFor { .. } => ErrorKind::DialFailed,
            NetError::SslProtocolError
            | NetError::AlpnNegotiationFailed
            | NetError::QuicHandshakeFailed
            | NetError::SslHandshakeFailedFor { .. }
            | NetError::QuicHandshakeFailedFor { .. } => ErrorKind::HandshakeFailed,
            NetError::EmptyResponse => ErrorKind::NilResponse,
            NetError::ContentLengthMismatch
            | NetError::IncompleteChunkedEncoding
            | NetError::ResponseHeadersTruncated
            | NetError::ResponseBodyTruncated => ErrorKind::IncompleteResponse,
            NetError::InvalidResponse
            | NetError::Http2ProtocolError
            | NetError::QuicProtocolError
            | NetError::ResponseBodyTooLarge
            | NetError::Unknown(_) => ErrorKind::ProtocolError,
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::Aborted => -3,
            NetError::TimedOut => -7,
            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionFailed | NetError::ConnectionFailedTo { .. } => -104,
            NetError::NameNotResolved | NetError::NameNotResolvedFor { .. } => -105,
            NetError::SslProtocolError | NetError::SslHandshakeFailedFor { .. } => -107,
            NetError::AddressInvalid => -108,
            NetError::AddressUnreachable => -109,
            NetError::ConnectionTimedOut => -118,
            NetError::AlpnNegotiationFailed => -122,
            NetError::AddressInUse => -147,

            NetError::InvalidUrl => -300,
            NetError::UnknownUrlScheme | NetError::UnsupportedSchemeFor { .. } => -302,
            NetError::InvalidResponse => -320,
            NetError::EmptyResponse => -324,
            NetError::Http2ProtocolError => -337,
            NetError::ContentLengthMismatch => -354,
            NetError::IncompleteChunkedEncoding => -355,
            NetError::QuicProtocolError => -356,
            NetError::ResponseHeadersTruncated => -357,
            NetError::QuicHandshakeFailed | NetError::QuicHandshakeFailedFor { .. } => -358,
            NetError::ResponseBodyTruncated => -905,
            NetError::ResponseBodyTooLarge => -906,
            NetError::Unknown(code) => *code,
        }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -3 => NetError::Aborted,
            -7 => NetError::TimedOut,
            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -107 => NetError::SslProtocolError,
            -108 => NetError::AddressInvalid,
            -109 => NetError::AddressUnreachable,
            -118 => NetError::ConnectionTimedOut,
            -122 => NetError::AlpnNegotiationFailed,
            -147 => NetError::AddressInUse,

            -300 => NetError::InvalidUrl,
            -302 => NetError::UnknownUrlScheme,
            -320 => NetError::InvalidResponse,
            -324 => NetError::EmptyResponse,
            -337 => NetError::Http2ProtocolError,
            -354 => NetError::ContentLengthMismatch,
            -355 => NetError::IncompleteChunkedEncoding,
            -356 => NetError::QuicProtocolError,
            -357 => NetError::ResponseHeadersTruncated,
            -358 => NetError::QuicHandshakeFailed,
            -905 => NetError::ResponseBodyTruncated,
            -906 => NetError::ResponseBodyTooLarge,
            _ => NetError::Unknown(code),
        }
    }
}
