//! UDP sockets for QUIC, with connection-ID demultiplexing.
//!
//! Every UDP socket has exactly one reader: a task that parses the
//! destination connection ID of each datagram and forwards it to the
//! connection that registered that ID. This lets many connections share
//! one socket without stealing each other's packets.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use dashmap::DashMap;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Length of the source connection IDs we generate.
pub(crate) const CID_LEN: usize = 16;

const ROUTE_QUEUE: usize = 256;
const MAX_DATAGRAM: usize = 65535;

type RouteTable = DashMap<Vec<u8>, mpsc::Sender<Datagram>>;

/// One received datagram.
#[derive(Debug)]
pub(crate) struct Datagram {
    pub data: Vec<u8>,
    pub from: SocketAddr,
}

/// Packets addressed to one connection ID. Dropping it unregisters the ID.
#[derive(Debug)]
pub(crate) struct Route {
    rx: mpsc::Receiver<Datagram>,
    routes: Arc<RouteTable>,
    cid: Vec<u8>,
}

impl Route {
    /// Next datagram, or `None` once the socket's reader has stopped.
    pub async fn recv(&mut self) -> Option<Datagram> {
        self.rx.recv().await
    }
}

impl Drop for Route {
    fn drop(&mut self) {
        self.routes.remove(&self.cid);
    }
}

/// A bound UDP socket plus its demultiplexing reader task.
#[derive(Debug)]
pub struct QuicSocket {
    /// `None` once closed.
    socket: RwLock<Option<Arc<UdpSocket>>>,
    local_addr: SocketAddr,
    routes: Arc<RouteTable>,
    reader: JoinHandle<()>,
}

impl QuicSocket {
    /// Bind an ephemeral port on the unspecified address of `family`'s
    /// address family.
    pub async fn bind_ephemeral(family: &SocketAddr) -> Result<Self, NetError> {
        let local: SocketAddr = if family.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        Self::bind(local).await
    }

    pub async fn bind(local: SocketAddr) -> Result<Self, NetError> {
        let socket = Arc::new(UdpSocket::bind(local).await.socket_context()?);
        let local_addr = socket.local_addr().socket_context()?;
        let routes: Arc<RouteTable> = Arc::new(DashMap::new());
        let reader = tokio::spawn(demux(socket.clone(), routes.clone()));
        debug!(%local_addr, "udp socket bound");
        Ok(Self { socket: RwLock::new(Some(socket)), local_addr, routes, reader })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether an address of `peer`'s family is reachable from this socket.
    pub fn same_family(&self, peer: &SocketAddr) -> bool {
        self.local_addr.is_ipv4() == peer.is_ipv4()
    }

    /// Number of connections currently registered.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Start receiving datagrams whose destination connection ID is `cid`.
    pub(crate) fn register(&self, cid: &[u8]) -> Result<Route, NetError> {
        if self.is_closed() || self.reader.is_finished() {
            return Err(NetError::ConnectionClosed);
        }
        let (tx, rx) = mpsc::channel(ROUTE_QUEUE);
        if self.routes.insert(cid.to_vec(), tx).is_some() {
            // 128 random bits colliding means something is badly wrong.
            return Err(NetError::AddressInUse);
        }
        Ok(Route { rx, routes: self.routes.clone(), cid: cid.to_vec() })
    }

    pub(crate) async fn send_to(&self, buf: &[u8], to: SocketAddr) -> io::Result<usize> {
        let socket = self
            .socket
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        trace!(local = %self.local_addr, peer = %to, len = buf.len(), "udp send");
        socket.send_to(buf, to).await
    }

    /// Stop the reader and release the socket. Registered connections see
    /// their routes end.
    pub fn close(&self) {
        self.reader.abort();
        if let Ok(mut guard) = self.socket.write() {
            guard.take();
        }
        self.routes.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.socket.read().map(|guard| guard.is_none()).unwrap_or(true)
    }
}

impl Drop for QuicSocket {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn demux(socket: Arc<UdpSocket>, routes: Arc<RouteTable>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            // ICMP errors surface here on some platforms; they are not fatal.
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionRefused
                        | io::ErrorKind::Interrupted
                ) =>
            {
                debug!(error = %e, "transient udp recv error");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "udp recv failed, stopping reader");
                return;
            }
        };
        trace!(peer = %from, len, "udp recv");

        let dcid = match quiche::Header::from_slice(&mut buf[..len], CID_LEN) {
            Ok(header) => header.dcid.to_vec(),
            Err(e) => {
                trace!(peer = %from, error = %e, "dropping unparsable datagram");
                continue;
            }
        };

        let Some(tx) = routes.get(&dcid).map(|entry| entry.value().clone()) else {
            trace!(peer = %from, "dropping datagram for unknown connection");
            continue;
        };
        // Full queue means the connection is not keeping up; drop like the network would.
        if let Err(mpsc::error::TrySendError::Closed(_)) =
            tx.try_send(Datagram { data: buf[..len].to_vec(), from })
        {
            routes.remove(&dcid);
        }
    }
}

/// The lazily-created socket shared by every dial of one dialer.
///
/// The first dial creates it; concurrent first dials wait for that one
/// creation. [`close`](SharedSocketHandle::close) releases it for good.
#[derive(Debug, Default)]
pub struct SharedSocketHandle {
    cell: OnceCell<Arc<QuicSocket>>,
    created: AtomicUsize,
    closed: AtomicBool,
}

impl SharedSocketHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared socket, binding it on first use in `peer`'s family.
    pub async fn get_or_bind(&self, peer: &SocketAddr) -> Result<Arc<QuicSocket>, NetError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NetError::ConnectionClosed);
        }
        self.cell
            .get_or_try_init(|| async {
                let socket = QuicSocket::bind_ephemeral(peer).await?;
                self.created.fetch_add(1, Ordering::Relaxed);
                Ok::<_, NetError>(Arc::new(socket))
            })
            .await
            .cloned()
    }

    /// The socket, if it was ever created.
    pub fn get(&self) -> Option<&Arc<QuicSocket>> {
        self.cell.get()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.get().map(|s| s.local_addr())
    }

    /// How many times a socket has been bound.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Release the socket. Returns `true` if one had been created.
    /// Later dials fail.
    pub fn close(&self) -> bool {
        let was_closed = self.closed.swap(true, Ordering::AcqRel);
        match self.cell.get() {
            Some(socket) if !was_closed => {
                debug!(local_addr = %socket.local_addr(), "closing shared udp socket");
                socket.close();
                true
            }
            _ => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for SharedSocketHandle {
    fn drop(&mut self) {
        self.close();
    }
}
