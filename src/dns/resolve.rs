//! Core DNS resolution types and traits.

use crate::base::neterror::NetError;
use std::{collections::HashMap, fmt, future::Future, net::SocketAddr, pin::Pin, sync::Arc};

/// A domain name to resolve into IP addresses.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct Name {
    host: Box<str>,
}

impl Name {
    #[inline]
    pub fn new(host: impl Into<Box<str>>) -> Self {
        Self { host: host.into() }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.host
    }

    /// Lowercased, without the trailing root dot. Used as the lookup key.
    pub fn canonical(&self) -> String {
        self.host.trim_end_matches('.').to_ascii_lowercase()
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name::new(value)
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Name::new(value)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.host, f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.host, f)
    }
}

pub type Addrs = Box<dyn Iterator<Item = SocketAddr> + Send>;

pub type Resolving = Pin<Box<dyn Future<Output = Result<Addrs, NetError>> + Send>>;

/// Name resolution, roughly Chromium's `HostResolver`.
///
/// Dialers hold resolvers as `Arc<dyn Resolve>`, so implementations take
/// `&self` and return a boxed future.
pub trait Resolve: Send + Sync {
    /// The returned addresses carry port 0 unless an override set one;
    /// [`lookup_endpoint`](super::lookup_endpoint) applies the service port.
    fn resolve(&self, name: Name) -> Resolving;
}

impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    fn resolve(&self, name: Name) -> Resolving {
        (**self).resolve(name)
    }
}

/// Answers selected names from a fixed table, everything else from `inner`.
///
/// Names match case-insensitively and ignore a trailing dot. An entry with
/// no addresses makes the name fail to resolve.
///
/// ```rust,ignore
/// let resolver = DnsResolverWithOverrides::new(Arc::new(GaiResolver::new()))
///     .with_override("origin.test", vec!["127.0.0.1:0".parse()?]);
/// ```
pub struct DnsResolverWithOverrides {
    inner: Arc<dyn Resolve>,
    overrides: HashMap<String, Vec<SocketAddr>>,
}

impl DnsResolverWithOverrides {
    pub fn new(inner: Arc<dyn Resolve>) -> Self {
        Self { inner, overrides: HashMap::new() }
    }

    pub fn with_override(mut self, host: &str, addrs: Vec<SocketAddr>) -> Self {
        self.overrides.insert(Name::new(host).canonical(), addrs);
        self
    }

    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

impl Resolve for DnsResolverWithOverrides {
    fn resolve(&self, name: Name) -> Resolving {
        let Some(addrs) = self.overrides.get(&name.canonical()) else {
            return self.inner.resolve(name);
        };
        tracing::debug!(host = %name, count = addrs.len(), "dns override hit");
        let result = if addrs.is_empty() {
            Err(NetError::NameNotResolved)
        } else {
            Ok(Box::new(addrs.clone().into_iter()) as Addrs)
        };
        Box::pin(std::future::ready(result))
    }
}

impl fmt::Debug for DnsResolverWithOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsResolverWithOverrides")
            .field("hosts", &self.overrides.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
