//! System resolver. `tokio::net::lookup_host` runs getaddrinfo on the
//! blocking pool.

use super::{Addrs, Name, Resolve, Resolving};
use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Clone, Debug, Default)]
pub struct GaiResolver;

impl GaiResolver {
    pub fn new() -> Self {
        Self
    }
}

impl Resolve for GaiResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let started = Instant::now();
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((name.as_str(), 0))
                .await
                .dns_context(name.as_str())?
                .collect();
            tracing::debug!(
                host = %name,
                count = addrs.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "getaddrinfo finished"
            );
            if addrs.is_empty() {
                return Err(NetError::NameNotResolved);
            }
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_localhost_is_loopback() {
        match GaiResolver::new().resolve(Name::new("localhost")).await {
            Ok(addrs) => {
                let list: Vec<_> = addrs.collect();
                assert!(!list.is_empty());
                assert!(list.iter().all(|a| a.ip().is_loopback() && a.port() == 0));
            }
            Err(e) => println!("localhost did not resolve here: {e}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_name_fails() {
        let err = GaiResolver::new().resolve(Name::new("name.invalid")).await.err();
        if let Some(err) = err {
            assert_eq!(err.kind(), crate::base::neterror::ErrorKind::DialFailed);
        }
    }
}
