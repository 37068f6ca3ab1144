use crate::base::context::IoResultExt;
use crate::base::deadline::Deadline;
use crate::base::endpoint::{Scheme, TargetEndpoint};
use crate::base::neterror::NetError;
use crate::dns::{lookup_endpoint, AddrPreference, Resolve};
use crate::http::{ConnectTiming, Protocol};
use crate::observer::{ConnectionEvent, ConnectionObserver};
use crate::socket::client::SocketType;
use crate::socket::tls::TlsConfig;
use crate::socket::transport::{Connection, DialedConnection, Dialer};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tracing::debug;

/// DNS → TCP → TLS, roughly equivalent to net::ConnectJob.
pub struct TcpTlsDialer {
    resolver: Arc<dyn Resolve>,
    preference: AddrPreference,
}

impl TcpTlsDialer {
    pub fn new(resolver: Arc<dyn Resolve>, preference: AddrPreference) -> Self {
        Self { resolver, preference }
    }

    async fn connect(
        &self,
        endpoint: &TargetEndpoint,
        tls: &TlsConfig,
        observer: &dyn ConnectionObserver,
    ) -> Result<DialedConnection, NetError> {
        let start = Instant::now();

        // 1. DNS Resolution
        let addrs = lookup_endpoint(self.resolver.as_ref(), endpoint, self.preference).await?;
        let resolved = start.elapsed();

        // 2. TCP Connect, first address that answers wins
        let mut last_err = NetError::ConnectionFailed;
        let mut connected = None;
        for addr in addrs {
            observer.on_event(&ConnectionEvent::dial_started(addr));
            match TcpStream::connect(addr).await.connection_context(endpoint.host(), endpoint.port())
            {
                Ok(stream) => {
                    connected = Some((stream, addr));
                    break;
                }
                Err(e) => {
                    debug!(%addr, error = %e, "tcp connect attempt failed");
                    last_err = e;
                }
            }
        }
        let Some((stream, remote_addr)) = connected else {
            return Err(last_err);
        };

        let local_addr = stream.local_addr().ok();
        // Disable Nagle's algorithm for lower latency on small requests.
        let _ = stream.set_nodelay(true);
        let mut timing = ConnectTiming { resolved, connected: start.elapsed(), handshake_done: None };
        observer.on_event(&ConnectionEvent::connected(local_addr, remote_addr));
        debug!(%remote_addr, ?local_addr, "tcp connected");

        if endpoint.scheme() == Scheme::Plain {
            return Ok(DialedConnection {
                connection: Connection::Stream(SocketType::Tcp(stream)),
                remote_addr,
                local_addr,
                protocol: Protocol::Http1,
                timing,
            });
        }

        // 3. SSL Handshake
        let server_name = tls.server_name_for(endpoint);
        let connector = tls.connector()?;
        let mut config = connector.configure().map_err(|_| NetError::SslProtocolError)?;
        config.set_use_server_name_indication(TlsConfig::should_set_sni(server_name));
        config.set_verify_hostname(tls.verify_peer);

        let tls_stream = tokio_boring::connect(config, server_name, stream).await.map_err(|e| {
            debug!(host = server_name, error = %e, "tls handshake failed");
            NetError::SslHandshakeFailedFor { host: server_name.to_string(), reason: e.to_string() }
        })?;

        let protocol = match tls_stream.ssl().selected_alpn_protocol() {
            Some(id) => Protocol::from_alpn(id).ok_or(NetError::AlpnNegotiationFailed)?,
            None => Protocol::Http1,
        };
        if protocol == Protocol::Http3 || (!tls.alpn.is_empty() && !tls.alpn.contains(&protocol)) {
            return Err(NetError::AlpnNegotiationFailed);
        }
        timing.handshake_done = Some(start.elapsed());
        observer.on_event(&ConnectionEvent::handshake_done(remote_addr, protocol));
        debug!(%remote_addr, %protocol, "tls established");

        Ok(DialedConnection {
            connection: Connection::Stream(SocketType::Ssl(tls_stream)),
            remote_addr,
            local_addr,
            protocol,
            timing,
        })
    }
}

impl Dialer for TcpTlsDialer {
    fn dial<'a>(
        &'a self,
        endpoint: &'a TargetEndpoint,
        tls: &'a TlsConfig,
        observer: &'a dyn ConnectionObserver,
        deadline: &'a Deadline,
    ) -> BoxFuture<'a, Result<DialedConnection, NetError>> {
        Box::pin(deadline.run(self.connect(endpoint, tls, observer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::neterror::ErrorKind;
    use crate::dns::GaiResolver;
    use crate::observer::{ChannelObserver, EventKind, NullObserver};
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn dialer() -> TcpTlsDialer {
        TcpTlsDialer::new(Arc::new(GaiResolver::new()), AddrPreference::default())
    }

    #[tokio::test]
    async fn test_plain_dial_reports_h1() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _conn = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let ep = TargetEndpoint::parse(&format!("http://{}/", addr)).unwrap();
        let (observer, mut events) = ChannelObserver::new();
        let dialed = dialer()
            .dial(&ep, &TlsConfig::default(), &observer, &Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(dialed.remote_addr, addr);
        assert_eq!(dialed.protocol, Protocol::Http1);
        assert!(dialed.timing.handshake_done.is_none());
        assert_eq!(events.recv().await.unwrap().kind, EventKind::DialStarted);
        let connected = events.recv().await.unwrap();
        assert_eq!(connected.kind, EventKind::Connected);
        assert_eq!(connected.remote_addr, Some(addr));
        assert_eq!(connected.local_addr, dialed.local_addr);
    }

    #[tokio::test]
    async fn test_refused_is_dial_failure() {
        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let ep = TargetEndpoint::parse(&format!("https://{}/", addr)).unwrap();
        let err = dialer()
            .dial(&ep, &TlsConfig::default(), &NullObserver, &Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DialFailed);
    }

    #[tokio::test]
    async fn test_tls_handshake_failure() {
        // A peer that accepts and then closes without speaking TLS.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((conn, _)) = listener.accept().await {
                drop(conn);
            }
        });

        let ep = TargetEndpoint::parse(&format!("https://{}/", addr)).unwrap();
        let err = dialer()
            .dial(&ep, &TlsConfig::default(), &NullObserver, &Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HandshakeFailed);
    }

    #[tokio::test]
    async fn test_cancelled_during_handshake() {
        // Accepts but never answers, so the handshake hangs until the deadline.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _conn = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let ep = TargetEndpoint::parse(&format!("https://{}/", addr)).unwrap();
        let started = Instant::now();
        let err = dialer()
            .dial(
                &ep,
                &TlsConfig::default(),
                &NullObserver,
                &Deadline::after(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
