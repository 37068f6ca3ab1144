//! Target identity derived from the request URL.

use crate::base::neterror::NetError;
use serde::Serialize;
use std::fmt;
use url::{Host, Url};

/// Whether the endpoint is reached in cleartext or over TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Plain,
    Tls,
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Plain => 80,
            Scheme::Tls => 443,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Plain => "http",
            Scheme::Tls => "https",
        }
    }
}

/// Host, port and TLS server name for one request target.
///
/// Built once from the input URL by [`TargetEndpoint::parse`] and never
/// mutated afterwards; [`TargetEndpoint::with_sni`] returns a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetEndpoint {
    host: String,
    port: u16,
    sni: String,
    scheme: Scheme,
    path: String,
}

impl TargetEndpoint {
    /// Parse an absolute `http` or `https` URL.
    ///
    /// An explicit port wins over the scheme default. IPv6 literals are
    /// stored without brackets. The SNI name starts out equal to the host.
    pub fn parse(input: &str) -> Result<Self, NetError> {
        let url = Url::parse(input.trim()).map_err(|e| {
            tracing::debug!(url = input, error = %e, "rejecting malformed url");
            NetError::InvalidUrl
        })?;
        Self::from_url(&url)
    }

    pub fn from_url(url: &Url) -> Result<Self, NetError> {
        let scheme = match url.scheme() {
            "http" => Scheme::Plain,
            "https" => Scheme::Tls,
            other => {
                return Err(NetError::UnsupportedSchemeFor {
                    scheme: other.to_string(),
                })
            }
        };

        let host = match url.host().ok_or(NetError::InvalidUrl)? {
            Host::Domain(d) => d.to_string(),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };
        if host.is_empty() {
            return Err(NetError::InvalidUrl);
        }

        let port = url.port().unwrap_or_else(|| scheme.default_port());
        if port == 0 {
            return Err(NetError::InvalidUrl);
        }

        let mut path = url.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            sni: host.clone(),
            host,
            port,
            scheme,
            path,
        })
    }

    /// Return a copy that presents `sni` instead of the host during TLS.
    pub fn with_sni(mut self, sni: impl Into<String>) -> Self {
        self.sni = sni.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn sni(&self) -> &str {
        &self.sni
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Path and query used as the request target.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_ip_literal(&self) -> bool {
        self.host.parse::<std::net::IpAddr>().is_ok()
    }

    /// `host[:port]` as sent in `Host` / `:authority`; the port is omitted
    /// when it equals the scheme default.
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == self.scheme.default_port() {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// `host:port` suitable for socket address lookup.
    pub fn host_port(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for TargetEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme.as_str(), self.authority(), self.path)
    }
}
