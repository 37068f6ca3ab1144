//! QUIC connection establishment.
//!
//! Drives the handshake to completion on the caller's task, so errors are
//! reported from the dial itself, then hands the connection to an
//! [`H3Driver`] task.

use crate::base::neterror::NetError;
use crate::http::{ConnectTiming, Protocol};
use crate::observer::{ConnectionEvent, ConnectionObserver};
use crate::quic::driver::{flush_egress, H3Driver, MAX_DATAGRAM_SIZE};
use crate::quic::handle::H3Handle;
use crate::quic::socket::{QuicSocket, CID_LEN};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// An established QUIC connection with an HTTP/3 session on top.
#[derive(Debug)]
pub struct QuicConnection {
    pub handle: H3Handle,
    pub protocol: Protocol,
    /// `resolved` is left for the caller to fill.
    pub timing: ConnectTiming,
}

impl QuicConnection {
    /// Handshake with `remote` over `socket`.
    ///
    /// `server_name` is sent as SNI and used for certificate verification;
    /// pass `None` for IP literals. Fires `Connected` when the first
    /// datagram from the peer arrives and `HandshakeDone` once established.
    pub(crate) async fn establish(
        socket: Arc<QuicSocket>,
        remote: SocketAddr,
        server_name: Option<&str>,
        mut config: quiche::Config,
        observer: &dyn ConnectionObserver,
        start: Instant,
    ) -> Result<Self, NetError> {
        let mut scid = [0u8; CID_LEN];
        getrandom::fill(&mut scid).map_err(|e| {
            debug!(error = %e, "rng failure");
            NetError::QuicProtocolError
        })?;
        let mut route = socket.register(&scid)?;
        let local = socket.local_addr();
        let scid = quiche::ConnectionId::from_ref(&scid);

        observer.on_event(&ConnectionEvent::dial_started(remote));
        let mut conn = quiche::connect(server_name, &scid, local, remote, &mut config)
            .map_err(|e| {
                debug!(%remote, error = %e, "quiche connect failed");
                NetError::QuicProtocolError
            })?;

        let mut out = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut timing = ConnectTiming::default();
        let mut heard_from_peer = false;

        // Handshake Loop
        loop {
            flush_egress(&mut conn, &socket, &mut out).await?;

            if conn.is_established() {
                break;
            }
            if conn.is_closed() {
                return Err(handshake_error(&conn, remote, heard_from_peer));
            }

            let wait = conn.timeout().unwrap_or(Duration::from_millis(100));
            match tokio::time::timeout(wait, route.recv()).await {
                Ok(Some(mut dgram)) => {
                    if !heard_from_peer {
                        heard_from_peer = true;
                        timing.connected = start.elapsed();
                        observer.on_event(&ConnectionEvent::connected(Some(local), dgram.from));
                        debug!(%local, peer = %dgram.from, "first datagram from peer");
                    }
                    let info = quiche::RecvInfo { from: dgram.from, to: local };
                    match conn.recv(&mut dgram.data, info) {
                        Ok(_) | Err(quiche::Error::Done) => {}
                        Err(e) => debug!(%remote, error = %e, "quic recv during handshake"),
                    }
                }
                Ok(None) => return Err(NetError::ConnectionClosed),
                Err(_) => conn.on_timeout(),
            }
        }

        let protocol = match Protocol::from_alpn(conn.application_proto()) {
            Some(Protocol::Http3) => Protocol::Http3,
            _ => {
                // CRYPTO_ERROR carrying the no_application_protocol alert.
                let _ = conn.close(false, 0x178, b"no application protocol");
                let _ = flush_egress(&mut conn, &socket, &mut out).await;
                return Err(NetError::AlpnNegotiationFailed);
            }
        };
        timing.handshake_done = Some(start.elapsed());
        observer.on_event(&ConnectionEvent::handshake_done(remote, protocol));
        debug!(%remote, %local, "quic established");

        let h3_config = quiche::h3::Config::new().map_err(|_| NetError::QuicProtocolError)?;
        let h3_conn = quiche::h3::Connection::with_transport(&mut conn, &h3_config)
            .map_err(|e| {
                debug!(%remote, error = %e, "h3 init failed");
                NetError::QuicProtocolError
            })?;

        // Spawn Driver
        let (tx, rx) = mpsc::channel(32);
        let driver = H3Driver::new(rx, conn, h3_conn, socket, route, remote);
        tokio::spawn(driver.drive());

        Ok(Self { handle: H3Handle::new(tx, remote, local), protocol, timing })
    }
}

fn handshake_error(conn: &quiche::Connection, remote: SocketAddr, heard_from_peer: bool) -> NetError {
    if !heard_from_peer && conn.is_timed_out() {
        return NetError::ConnectionTimedOut;
    }
    let reason = match (conn.peer_error(), conn.local_error()) {
        (Some(e), _) => format!("peer closed: code {:#x} {}", e.error_code, String::from_utf8_lossy(&e.reason)),
        (None, Some(e)) => format!("local error: code {:#x} {}", e.error_code, String::from_utf8_lossy(&e.reason)),
        (None, None) if conn.is_timed_out() => "idle timeout".to_string(),
        (None, None) => "closed".to_string(),
    };
    debug!(%remote, %reason, "quic handshake failed");
    NetError::QuicHandshakeFailedFor { peer: remote.to_string(), reason }
}
