use crate::base::endpoint::TargetEndpoint;
use crate::base::neterror::NetError;
use crate::http::protocol::{alpn_wire, Protocol};
use boring::ssl::{SslConnector, SslContextBuilder, SslMethod, SslVerifyMode, SslVersion};
use boring::x509::X509Ref;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::debug;

/// TLS settings shared by the TCP and QUIC dialers.
///
/// QUIC always runs TLS 1.3 and negotiates `h3`, so `min_version`,
/// `max_version`, `cipher_list` and `alpn` only affect TCP.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Pre-set server name. When `None` the endpoint's SNI is used.
    pub server_name: Option<String>,
    pub min_version: Option<SslVersion>,
    pub max_version: Option<SslVersion>,
    pub cipher_list: Option<String>,
    /// ALPN offered over TCP, in preference order.
    pub alpn: Vec<Protocol>,
    pub curves: Vec<String>, // Curve names like "X25519", "P-256"
    pub sigalgs: Option<String>,
    /// Verify the peer certificate chain and hostname.
    pub verify_peer: bool,
    /// Extra CA bundle; system roots are used otherwise.
    pub ca_file: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            server_name: None,
            min_version: Some(SslVersion::TLS1_2),
            max_version: Some(SslVersion::TLS1_3),
            cipher_list: None,
            alpn: vec![Protocol::Http1],
            curves: vec!["X25519".to_string(), "P-256".to_string(), "P-384".to_string()],
            sigalgs: None,
            verify_peer: true,
            ca_file: None,
        }
    }
}

impl TlsConfig {
    /// Offer `h2` before `http/1.1`.
    pub fn with_h2(mut self) -> Self {
        self.alpn = vec![Protocol::Http2, Protocol::Http1];
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn insecure(mut self) -> Self {
        self.verify_peer = false;
        self
    }

    /// The name presented to the server: the pre-set one if any, else the
    /// endpoint's SNI.
    pub fn server_name_for<'a>(&'a self, endpoint: &'a TargetEndpoint) -> &'a str {
        self.server_name.as_deref().unwrap_or_else(|| endpoint.sni())
    }

    /// Check if SNI (Server Name Indication) should be set for this host.
    /// Per RFC 6066, SNI MUST NOT be set for raw IP addresses.
    pub fn should_set_sni(host: &str) -> bool {
        Self::ip_literal(host).is_none()
    }

    /// `host` as an IP address, brackets allowed.
    pub fn ip_literal(host: &str) -> Option<IpAddr> {
        host.trim_start_matches('[').trim_end_matches(']').parse().ok()
    }

    /// Build a connector for TCP+TLS.
    pub fn connector(&self) -> Result<SslConnector, NetError> {
        let mut builder =
            SslConnector::builder(SslMethod::tls()).map_err(|_| NetError::SslProtocolError)?;

        if let Some(min) = self.min_version {
            builder.set_min_proto_version(Some(min)).map_err(|_| NetError::SslProtocolError)?;
        }
        if let Some(max) = self.max_version {
            builder.set_max_proto_version(Some(max)).map_err(|_| NetError::SslProtocolError)?;
        }
        if let Some(ciphers) = &self.cipher_list {
            builder.set_cipher_list(ciphers).map_err(|_| NetError::SslProtocolError)?;
        }
        if !self.alpn.is_empty() {
            builder
                .set_alpn_protos(&alpn_wire(&self.alpn))
                .map_err(|_| NetError::SslProtocolError)?;
        }

        self.apply_common(&mut builder)?;
        Ok(builder.build())
    }

    /// Settings that apply to both TCP and QUIC contexts.
    pub(crate) fn apply_common(&self, builder: &mut SslContextBuilder) -> Result<(), NetError> {
        if let Some(sigalgs) = &self.sigalgs {
            builder.set_sigalgs_list(sigalgs).map_err(|_| NetError::SslProtocolError)?;
        }
        if !self.curves.is_empty() {
            builder
                .set_curves_list(&self.curves.join(":"))
                .map_err(|_| NetError::SslProtocolError)?;
        }

        if self.verify_peer {
            builder.set_default_verify_paths().map_err(|_| NetError::SslProtocolError)?;
            if let Some(ca) = &self.ca_file {
                builder.set_ca_file(ca).map_err(|_| NetError::SslProtocolError)?;
            }
            builder.set_verify(SslVerifyMode::PEER);
        } else {
            builder.set_verify(SslVerifyMode::NONE);
        }
        Ok(())
    }
}

/// Require the leaf certificate to carry `ip` as a subjectAltName, on top
/// of chain verification. Used where no hostname check is configured.
pub(crate) fn require_ip_san(builder: &mut SslContextBuilder, ip: IpAddr) {
    builder.set_verify_callback(SslVerifyMode::PEER, move |preverified, ctx| {
        if !preverified || ctx.error_depth() != 0 {
            return preverified;
        }
        let matched = ctx.current_cert().is_some_and(|cert| cert_has_ip(cert, ip));
        if !matched {
            debug!(%ip, "peer certificate does not cover the target address");
        }
        matched
    });
}

/// Whether `cert` lists `ip` among its subjectAltName IP addresses.
pub(crate) fn cert_has_ip(cert: &X509Ref, ip: IpAddr) -> bool {
    let want = match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    };
    cert.subject_alt_names()
        .is_some_and(|names| names.iter().any(|name| name.ipaddress() == Some(want.as_slice())))
}
