//! QUIC connection configuration.

use crate::base::neterror::NetError;
use crate::socket::tls::{require_ip_san, TlsConfig};
use boring::ssl::{SslContextBuilder, SslMethod};
use std::net::IpAddr;
use std::time::Duration;

/// Transport parameters for QUIC dials. TLS settings come from
/// [`TlsConfig`]; these only shape the QUIC layer.
#[derive(Debug, Clone)]
pub struct QuicConfig {
    /// Connection closes after this long without traffic.
    pub idle_timeout: Duration,
    /// Upper bound for outgoing datagrams, including the 1200-byte Initial.
    pub max_udp_payload_size: u16,
    pub initial_max_data: u64,
    /// Applied to bidi (local and remote) and uni streams alike.
    pub initial_max_stream_data: u64,
    pub initial_max_streams_bidi: u64,
    pub initial_max_streams_uni: u64,
    /// Offered in order; the first one the server accepts wins.
    pub alpn_protocols: Vec<String>,
}

impl Default for QuicConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            max_udp_payload_size: 1350,
            initial_max_data: 10 << 20,
            initial_max_stream_data: 1 << 20,
            initial_max_streams_bidi: 100,
            initial_max_streams_uni: 100,
            alpn_protocols: vec!["h3".to_string()],
        }
    }
}

impl QuicConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn max_udp_payload_size(mut self, size: u16) -> Self {
        self.max_udp_payload_size = size;
        self
    }

    /// Connection-level flow control window.
    pub fn initial_max_data(mut self, max: u64) -> Self {
        self.initial_max_data = max;
        self
    }

    pub fn initial_max_stream_data(mut self, max: u64) -> Self {
        self.initial_max_stream_data = max;
        self
    }

    pub fn alpn_protocols(mut self, protocols: Vec<String>) -> Self {
        self.alpn_protocols = protocols;
        self
    }

    /// Build the engine configuration, with TLS on a BoringSSL context that
    /// shares curves, signature algorithms and trust roots with TCP.
    ///
    /// quiche only checks hostnames, so a target given as `ip_target`
    /// has the certificate's IP SAN checked here instead.
    pub(crate) fn to_quiche(
        &self,
        tls: &TlsConfig,
        ip_target: Option<IpAddr>,
    ) -> Result<quiche::Config, NetError> {
        let mut ssl_ctx_builder =
            SslContextBuilder::new(SslMethod::tls_client()).map_err(|_| NetError::SslProtocolError)?;
        tls.apply_common(&mut ssl_ctx_builder)?;
        if let (true, Some(ip)) = (tls.verify_peer, ip_target) {
            require_ip_san(&mut ssl_ctx_builder, ip);
        }

        let mut config =
            quiche::Config::with_boring_ssl_ctx_builder(quiche::PROTOCOL_VERSION, ssl_ctx_builder)
                .map_err(|e| {
                    tracing::debug!(error = %e, "quiche config rejected");
                    NetError::QuicProtocolError
                })?;

        let alpn: Vec<&[u8]> = self.alpn_protocols.iter().map(|p| p.as_bytes()).collect();
        let alpn: &[&[u8]] = if alpn.is_empty() { quiche::h3::APPLICATION_PROTOCOL } else { &alpn };
        config.set_application_protos(alpn).map_err(|_| NetError::QuicProtocolError)?;

        config.verify_peer(tls.verify_peer);
        config.set_max_idle_timeout(self.idle_timeout.as_millis() as u64);
        config.set_max_recv_udp_payload_size(65535);
        config.set_max_send_udp_payload_size(self.max_udp_payload_size as usize);
        config.set_initial_max_data(self.initial_max_data);
        config.set_initial_max_stream_data_bidi_local(self.initial_max_stream_data);
        config.set_initial_max_stream_data_bidi_remote(self.initial_max_stream_data);
        config.set_initial_max_stream_data_uni(self.initial_max_stream_data);
        config.set_initial_max_streams_bidi(self.initial_max_streams_bidi);
        config.set_initial_max_streams_uni(self.initial_max_streams_uni);
        // One socket may carry many connections; never migrate.
        config.set_disable_active_migration(true);

        Ok(config)
    }
}
