//! The dialer seam: one trait, one implementation per transport variant.

use crate::base::deadline::Deadline;
use crate::base::endpoint::TargetEndpoint;
use crate::base::neterror::NetError;
use crate::dns::{AddrPreference, GaiResolver, Resolve};
use crate::http::{ConnectTiming, Protocol};
use crate::observer::ConnectionObserver;
use crate::quic::{H3Handle, QuicConfig, QuicDialer, SocketMode};
use crate::socket::client::SocketType;
use crate::socket::tcp::TcpTlsDialer;
use crate::socket::tls::TlsConfig;
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// The transports a request can be sent over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransportVariant {
    #[serde(rename = "tcp+tls")]
    TcpTls,
    /// QUIC with a fresh UDP socket per dial.
    #[serde(rename = "quic")]
    QuicDefault,
    /// QUIC over one UDP socket shared by every dial.
    #[serde(rename = "quic-shared-socket")]
    QuicSharedSocket,
}

impl TransportVariant {
    pub const ALL: [TransportVariant; 3] = [
        TransportVariant::QuicDefault,
        TransportVariant::TcpTls,
        TransportVariant::QuicSharedSocket,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransportVariant::TcpTls => "tcp+tls",
            TransportVariant::QuicDefault => "quic",
            TransportVariant::QuicSharedSocket => "quic-shared-socket",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.name().eq_ignore_ascii_case(name))
    }

    pub fn is_quic(&self) -> bool {
        !matches!(self, TransportVariant::TcpTls)
    }
}

impl fmt::Display for TransportVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An established transport connection, ready for HTTP.
#[derive(Debug)]
pub enum Connection {
    /// TCP, possibly TLS-wrapped; HTTP/1.1 or HTTP/2 is layered on top.
    Stream(SocketType),
    /// QUIC connection already carrying an HTTP/3 session.
    Quic(H3Handle),
}

/// What a successful dial hands back to the caller.
#[derive(Debug)]
pub struct DialedConnection {
    pub connection: Connection,
    /// The address actually connected to.
    pub remote_addr: SocketAddr,
    pub local_addr: Option<SocketAddr>,
    /// Protocol selected by ALPN.
    pub protocol: Protocol,
    pub timing: ConnectTiming,
}

/// Opens a connection to an endpoint.
///
/// Implementations must honor `deadline` and drop every resource they
/// created when it fires. Events go to `observer` as they happen.
pub trait Dialer: Send + Sync {
    fn dial<'a>(
        &'a self,
        endpoint: &'a TargetEndpoint,
        tls: &'a TlsConfig,
        observer: &'a dyn ConnectionObserver,
        deadline: &'a Deadline,
    ) -> BoxFuture<'a, Result<DialedConnection, NetError>>;

    /// Release long-lived resources. Returns `true` if any were held.
    fn close(&self) -> bool {
        false
    }
}

/// Settings shared by every dialer a [`Transport`] may build.
#[derive(Clone)]
pub struct TransportOptions {
    pub tls: TlsConfig,
    pub quic: QuicConfig,
    pub resolver: Arc<dyn Resolve>,
    pub preference: AddrPreference,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            tls: TlsConfig::default(),
            quic: QuicConfig::default(),
            resolver: Arc::new(GaiResolver::new()),
            preference: AddrPreference::default(),
        }
    }
}

impl fmt::Debug for TransportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportOptions")
            .field("tls", &self.tls)
            .field("quic", &self.quic)
            .field("preference", &self.preference)
            .finish()
    }
}

/// A transport variant bound to its configuration and dialer.
#[derive(Clone)]
pub struct Transport {
    variant: TransportVariant,
    tls: TlsConfig,
    dialer: Arc<dyn Dialer>,
}

impl Transport {
    pub fn new(variant: TransportVariant, options: &TransportOptions) -> Self {
        let dialer: Arc<dyn Dialer> = match variant {
            TransportVariant::TcpTls => Arc::new(TcpTlsDialer::new(
                options.resolver.clone(),
                options.preference,
            )),
            TransportVariant::QuicDefault => Arc::new(QuicDialer::new(
                SocketMode::PerDial,
                options.quic.clone(),
                options.resolver.clone(),
                options.preference,
            )),
            TransportVariant::QuicSharedSocket => Arc::new(QuicDialer::new(
                SocketMode::Shared,
                options.quic.clone(),
                options.resolver.clone(),
                options.preference,
            )),
        };
        Self::with_dialer(variant, options.tls.clone(), dialer)
    }

    /// Use a custom dialer for `variant`.
    pub fn with_dialer(variant: TransportVariant, tls: TlsConfig, dialer: Arc<dyn Dialer>) -> Self {
        Self { variant, tls, dialer }
    }

    pub fn variant(&self) -> TransportVariant {
        self.variant
    }

    pub fn tls(&self) -> &TlsConfig {
        &self.tls
    }

    pub async fn dial(
        &self,
        endpoint: &TargetEndpoint,
        observer: &dyn ConnectionObserver,
        deadline: &Deadline,
    ) -> Result<DialedConnection, NetError> {
        self.dialer.dial(endpoint, &self.tls, observer, deadline).await
    }

    /// See [`Dialer::close`].
    pub fn close(&self) -> bool {
        self.dialer.close()
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("variant", &self.variant)
            .field("tls", &self.tls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_names() {
        assert_eq!(TransportVariant::TcpTls.name(), "tcp+tls");
        assert_eq!(TransportVariant::QuicDefault.to_string(), "quic");
        assert_eq!(
            TransportVariant::from_name("QUIC-shared-socket"),
            Some(TransportVariant::QuicSharedSocket)
        );
        assert_eq!(TransportVariant::from_name("sctp"), None);
    }

    #[test]
    fn test_default_order() {
        assert_eq!(TransportVariant::ALL[0], TransportVariant::QuicDefault);
        assert_eq!(TransportVariant::ALL[1], TransportVariant::TcpTls);
        assert!(!TransportVariant::TcpTls.is_quic());
        assert!(TransportVariant::QuicSharedSocket.is_quic());
    }

    #[test]
    fn test_tcp_transport_close_is_noop() {
        let transport = Transport::new(TransportVariant::TcpTls, &TransportOptions::default());
        assert_eq!(transport.variant(), TransportVariant::TcpTls);
        assert!(!transport.close());
    }
}
