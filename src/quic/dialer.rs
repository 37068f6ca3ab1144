use crate::base::deadline::Deadline;
use crate::base::endpoint::{Scheme, TargetEndpoint};
use crate::base::neterror::NetError;
use crate::dns::{lookup_endpoint, AddrPreference, Resolve};
use crate::observer::ConnectionObserver;
use crate::quic::config::QuicConfig;
use crate::quic::connection::QuicConnection;
use crate::quic::socket::{QuicSocket, SharedSocketHandle};
use crate::socket::tls::TlsConfig;
use crate::socket::transport::{Connection, DialedConnection, Dialer};
use futures::future::BoxFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Where a QUIC dial gets its UDP socket from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketMode {
    /// Bind a fresh ephemeral socket per dial; it lives as long as the
    /// connection.
    PerDial,
    /// Bind one socket on first dial and reuse it for every later dial.
    Shared,
}

/// QUIC + HTTP/3 dialer.
pub struct QuicDialer {
    mode: SocketMode,
    config: QuicConfig,
    resolver: Arc<dyn Resolve>,
    preference: AddrPreference,
    shared: SharedSocketHandle,
}

impl QuicDialer {
    pub fn new(
        mode: SocketMode,
        config: QuicConfig,
        resolver: Arc<dyn Resolve>,
        preference: AddrPreference,
    ) -> Self {
        Self { mode, config, resolver, preference, shared: SharedSocketHandle::new() }
    }

    pub fn mode(&self) -> SocketMode {
        self.mode
    }

    /// The shared socket slot. Stays empty in [`SocketMode::PerDial`].
    pub fn shared_socket(&self) -> &SharedSocketHandle {
        &self.shared
    }

    async fn connect(
        &self,
        endpoint: &TargetEndpoint,
        tls: &TlsConfig,
        observer: &dyn ConnectionObserver,
    ) -> Result<DialedConnection, NetError> {
        if endpoint.scheme() != Scheme::Tls {
            return Err(NetError::UnsupportedSchemeFor {
                scheme: endpoint.scheme().as_str().to_string(),
            });
        }

        let start = Instant::now();
        let addrs = lookup_endpoint(self.resolver.as_ref(), endpoint, self.preference).await?;
        let resolved = start.elapsed();

        let (socket, remote) = match self.mode {
            SocketMode::PerDial => {
                let remote = addrs[0];
                (Arc::new(QuicSocket::bind_ephemeral(&remote).await?), remote)
            }
            SocketMode::Shared => self.shared_socket_for(&addrs).await?,
        };
        debug!(%remote, local = %socket.local_addr(), mode = ?self.mode, "dialing quic");

        let server_name = tls.server_name_for(endpoint);
        let ip_target = TlsConfig::ip_literal(server_name);
        let sni = ip_target.is_none().then_some(server_name);
        let quiche_config = self.config.to_quiche(tls, ip_target)?;

        let conn =
            QuicConnection::establish(socket, remote, sni, quiche_config, observer, start).await?;
        let mut timing = conn.timing;
        timing.resolved = resolved;

        Ok(DialedConnection {
            remote_addr: remote,
            local_addr: Some(conn.handle.local_addr()),
            protocol: conn.protocol,
            timing,
            connection: Connection::Quic(conn.handle),
        })
    }

    /// Pick the first address the shared socket can reach, binding the
    /// socket on first use.
    async fn shared_socket_for(
        &self,
        addrs: &[SocketAddr],
    ) -> Result<(Arc<QuicSocket>, SocketAddr), NetError> {
        let remote = match self.shared.get() {
            Some(socket) => *addrs
                .iter()
                .find(|a| socket.same_family(a))
                .ok_or(NetError::AddressUnreachable)?,
            None => addrs[0],
        };
        let socket = self.shared.get_or_bind(&remote).await?;
        // Another dial may have bound it meanwhile, in the other family.
        if !socket.same_family(&remote) {
            return Err(NetError::AddressUnreachable);
        }
        Ok((socket, remote))
    }
}

impl Dialer for QuicDialer {
    fn dial<'a>(
        &'a self,
        endpoint: &'a TargetEndpoint,
        tls: &'a TlsConfig,
        observer: &'a dyn ConnectionObserver,
        deadline: &'a Deadline,
    ) -> BoxFuture<'a, Result<DialedConnection, NetError>> {
        Box::pin(deadline.run(self.connect(endpoint, tls, observer)))
    }

    fn close(&self) -> bool {
        match self.mode {
            SocketMode::Shared => self.shared.close(),
            SocketMode::PerDial => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::neterror::ErrorKind;
    use crate::dns::GaiResolver;
    use crate::observer::{ChannelObserver, EventKind, NullObserver};
    use std::time::Duration;
    use tokio::net::UdpSocket;

    fn dialer(mode: SocketMode) -> QuicDialer {
        QuicDialer::new(
            mode,
            QuicConfig::default(),
            Arc::new(GaiResolver::new()),
            AddrPreference::default(),
        )
    }

    /// Source of the next datagram; anything else queued is discarded.
    async fn first_sender(peer: &UdpSocket) -> SocketAddr {
        let mut buf = [0u8; 2048];
        let (_, from) = peer.recv_from(&mut buf).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        while peer.try_recv_from(&mut buf).is_ok() {}
        from
    }

    #[tokio::test]
    async fn test_plain_scheme_rejected() {
        let ep = TargetEndpoint::parse("http://127.0.0.1:8080/").unwrap();
        let err = dialer(SocketMode::PerDial)
            .dial(&ep, &TlsConfig::default(), &NullObserver, &Deadline::never())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedScheme);
    }

    #[tokio::test]
    async fn test_silent_peer_times_out_without_connected() {
        // A UDP peer that swallows everything.
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let ep = TargetEndpoint::parse(&format!("https://{}/", peer.local_addr().unwrap())).unwrap();
        let (observer, mut events) = ChannelObserver::new();

        let started = Instant::now();
        let err = dialer(SocketMode::PerDial)
            .dial(&ep, &TlsConfig::default(), &observer, &Deadline::after(Duration::from_millis(150)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));

        // The ClientHello went out, nothing came back.
        let mut buf = [0u8; 2048];
        let (len, _) = peer.try_recv_from(&mut buf).unwrap();
        assert!(len >= 1200);

        assert_eq!(events.recv().await.unwrap().kind, EventKind::DialStarted);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shared_socket_is_reused_and_released() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let ep = TargetEndpoint::parse(&format!("https://{}/", peer.local_addr().unwrap())).unwrap();
        let dialer = dialer(SocketMode::Shared);

        let mut seen = Vec::new();
        for _ in 0..2 {
            let _ = dialer
                .dial(&ep, &TlsConfig::default(), &NullObserver, &Deadline::after(Duration::from_millis(50)))
                .await;
            seen.push(first_sender(&peer).await);
        }

        assert_eq!(dialer.shared_socket().created_count(), 1);
        assert_eq!(seen[0].port(), seen[1].port());
        assert_eq!(dialer.shared_socket().local_addr().map(|a| a.port()), Some(seen[0].port()));
        // Cancelled dials leave no routes behind.
        assert_eq!(dialer.shared_socket().get().unwrap().route_count(), 0);

        assert!(dialer.close());
        assert!(!dialer.close());
        let err = dialer
            .dial(&ep, &TlsConfig::default(), &NullObserver, &Deadline::after(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DialFailed);
    }

    #[tokio::test]
    async fn test_shared_socket_family_mismatch() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let v4 = TargetEndpoint::parse(&format!("https://{}/", peer.local_addr().unwrap())).unwrap();
        let dialer = dialer(SocketMode::Shared);
        let _ = dialer
            .dial(&v4, &TlsConfig::default(), &NullObserver, &Deadline::after(Duration::from_millis(20)))
            .await;
        assert!(dialer.shared_socket().get().is_some());

        let v6 = TargetEndpoint::parse("https://[::1]:4433/").unwrap();
        let err = dialer
            .dial(&v6, &TlsConfig::default(), &NullObserver, &Deadline::after(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DialFailed);
        assert_eq!(dialer.shared_socket().created_count(), 1);
        assert!(!dialer.shared_socket().is_closed());
    }

    #[tokio::test]
    async fn test_per_dial_sockets_differ() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let ep = TargetEndpoint::parse(&format!("https://{}/", peer.local_addr().unwrap())).unwrap();
        let dialer = dialer(SocketMode::PerDial);

        let mut ports = Vec::new();
        for _ in 0..2 {
            let _ = dialer
                .dial(&ep, &TlsConfig::default(), &NullObserver, &Deadline::after(Duration::from_millis(50)))
                .await;
            ports.push(first_sender(&peer).await.port());
        }
        assert_ne!(ports[0], ports[1]);
        assert!(dialer.shared_socket().get().is_none());
        assert!(!dialer.close());
    }
}
