//! Turning a [`TargetEndpoint`] into ordered socket addresses.

use super::{Name, Resolve};
use crate::base::endpoint::TargetEndpoint;
use crate::base::neterror::NetError;
use std::net::{IpAddr, SocketAddr};

/// Address family ordering applied after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddrPreference {
    /// IPv4 addresses first, IPv6 after.
    #[default]
    Ipv4First,
    /// IPv6 addresses first, IPv4 after.
    Ipv6First,
    /// Keep the resolver's order.
    AsResolved,
}

impl AddrPreference {
    /// Stable reorder by family; relative order inside a family is kept.
    pub fn order(&self, addrs: &mut [SocketAddr]) {
        match self {
            AddrPreference::Ipv4First => addrs.sort_by_key(|a| a.is_ipv6()),
            AddrPreference::Ipv6First => addrs.sort_by_key(|a| a.is_ipv4()),
            AddrPreference::AsResolved => {}
        }
    }
}

/// Resolve `endpoint.host()` and stamp `endpoint.port()` onto every result.
///
/// IP literals bypass the resolver. Addresses an override already gave a
/// non-zero port keep it. Duplicates are removed.
pub async fn lookup_endpoint(
    resolver: &dyn Resolve,
    endpoint: &TargetEndpoint,
    preference: AddrPreference,
) -> Result<Vec<SocketAddr>, NetError> {
    if let Ok(ip) = endpoint.host().parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, endpoint.port())]);
    }

    let mut addrs: Vec<SocketAddr> = Vec::new();
    for mut addr in resolver.resolve(Name::new(endpoint.host())).await? {
        if addr.port() == 0 {
            addr.set_port(endpoint.port());
        }
        if !addrs.contains(&addr) {
            addrs.push(addr);
        }
    }
    if addrs.is_empty() {
        return Err(NetError::NameNotResolved);
    }

    preference.order(&mut addrs);
    tracing::debug!(host = endpoint.host(), addrs = ?addrs, "resolved endpoint");
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{Addrs, Resolving};

    struct Fixed(Vec<SocketAddr>);

    impl Resolve for Fixed {
        fn resolve(&self, _name: Name) -> Resolving {
            let addrs = self.0.clone();
            Box::pin(async move { Ok(Box::new(addrs.into_iter()) as Addrs) })
        }
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_ip_literal_bypasses_resolver() {
        let ep = TargetEndpoint::parse("https://127.0.0.1:8443/").unwrap();
        let addrs = lookup_endpoint(&Fixed(vec![]), &ep, AddrPreference::default())
            .await
            .unwrap();
        assert_eq!(addrs, vec![addr("127.0.0.1:8443")]);
    }

    #[tokio::test]
    async fn test_port_applied_and_ipv4_preferred() {
        let ep = TargetEndpoint::parse("https://example.com/").unwrap();
        let resolver = Fixed(vec![addr("[2001:db8::1]:0"), addr("192.0.2.1:0"), addr("192.0.2.1:0")]);
        let addrs = lookup_endpoint(&resolver, &ep, AddrPreference::Ipv4First)
            .await
            .unwrap();
        assert_eq!(addrs, vec![addr("192.0.2.1:443"), addr("[2001:db8::1]:443")]);
    }

    #[tokio::test]
    async fn test_ipv6_first() {
        let ep = TargetEndpoint::parse("http://example.com/").unwrap();
        let resolver = Fixed(vec![addr("192.0.2.1:0"), addr("[2001:db8::1]:0")]);
        let addrs = lookup_endpoint(&resolver, &ep, AddrPreference::Ipv6First)
            .await
            .unwrap();
        assert!(addrs[0].is_ipv6());
        assert_eq!(addrs[1], addr("192.0.2.1:80"));
    }

    #[tokio::test]
    async fn test_override_port_is_kept() {
        let ep = TargetEndpoint::parse("http://example.com/").unwrap();
        let resolver = Fixed(vec![addr("127.0.0.1:9999")]);
        let addrs = lookup_endpoint(&resolver, &ep, AddrPreference::AsResolved)
            .await
            .unwrap();
        assert_eq!(addrs, vec![addr("127.0.0.1:9999")]);
    }

    #[tokio::test]
    async fn test_empty_result_is_error() {
        let ep = TargetEndpoint::parse("http://example.com/").unwrap();
        let err = lookup_endpoint(&Fixed(vec![]), &ep, AddrPreference::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::NameNotResolved));
    }
}
