use crate::base::endpoint::TargetEndpoint;
use crate::http::streamfactory::HttpStream;
use crate::socket::tls::TlsConfig;
use crate::socket::transport::TransportVariant;
use dashmap::DashMap;
use std::net::SocketAddr;

/// Identifies connections that may serve the same request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    variant: TransportVariant,
    host: String,
    port: u16,
    sni: String,
}

impl PoolKey {
    pub fn new(variant: TransportVariant, endpoint: &TargetEndpoint, tls: &TlsConfig) -> Self {
        Self {
            variant,
            host: endpoint.host().to_string(),
            port: endpoint.port(),
            sni: tls.server_name_for(endpoint).to_string(),
        }
    }
}

/// A live HTTP stream plus where it is connected.
#[derive(Debug)]
pub struct PooledStream {
    pub stream: HttpStream,
    pub remote_addr: SocketAddr,
    pub local_addr: Option<SocketAddr>,
}

impl PooledStream {
    fn share(&self) -> Option<Self> {
        Some(Self {
            stream: self.stream.try_clone()?,
            remote_addr: self.remote_addr,
            local_addr: self.local_addr,
        })
    }
}

/// Idle and multiplexed connections, keyed by [`PoolKey`].
///
/// HTTP/1.1 streams are handed out exclusively and come back through
/// [`put`](ConnectionPool::put) after a full body read. HTTP/2 and HTTP/3
/// streams stay in the pool and are shared.
#[derive(Debug)]
pub struct ConnectionPool {
    idle: DashMap<PoolKey, Vec<PooledStream>>,
    max_idle_per_key: usize,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::with_max_idle(6)
    }

    pub fn with_max_idle(max_idle_per_key: usize) -> Self {
        Self { idle: DashMap::new(), max_idle_per_key }
    }

    /// A usable stream for `key`, if one is alive. Dead entries are evicted.
    pub fn take(&self, key: &PoolKey) -> Option<PooledStream> {
        let mut entries = self.idle.get_mut(key)?;
        entries.retain(|p| p.stream.is_reusable());

        if let Some(shared) = entries.iter().find_map(PooledStream::share) {
            return Some(shared);
        }
        entries.pop()
    }

    /// Return a stream after use. Closed streams are dropped.
    pub fn put(&self, key: PoolKey, pooled: PooledStream) {
        if !pooled.stream.is_reusable() {
            return;
        }
        let mut entries = self.idle.entry(key).or_default();
        if pooled.stream.is_multiplexed()
            && entries.iter().any(|p| p.stream.is_multiplexed() && p.stream.is_reusable())
        {
            return;
        }
        if entries.len() < self.max_idle_per_key {
            entries.push(pooled);
        }
    }

    pub fn idle_count(&self, key: &PoolKey) -> usize {
        self.idle.get(key).map(|e| e.len()).unwrap_or(0)
    }

    /// Drop every pooled stream, closing the underlying connections.
    pub fn clear(&self) {
        self.idle.clear();
    }
}
