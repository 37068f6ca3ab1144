//! A minimal HTTP/3 server on quiche, answering every request with `200`.

use boring::ssl::{SslContextBuilder, SslMethod};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use super::tls::self_signed;

const SERVER_CID_LEN: usize = 16;
const MAX_DATAGRAM_SIZE: usize = 1350;

/// One accepted QUIC connection.
struct ServerConn {
    /// Our connection ID; the client uses it once it has heard from us.
    scid: Vec<u8>,
    /// The client's first destination ID, still used on retransmitted Initials.
    odcid: Vec<u8>,
    conn: quiche::Connection,
    h3: Option<quiche::h3::Connection>,
}

pub struct MockH3Server {
    socket: UdpSocket,
    port: u16,
    accepted: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockH3Server {
    pub async fn new() -> std::io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let port = socket.local_addr()?.port();
        Ok(Self {
            socket,
            port,
            accepted: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn url(&self) -> String {
        format!("https://127.0.0.1:{}/", self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// QUIC connections accepted so far.
    pub fn accepted(&self) -> Arc<AtomicUsize> {
        self.accepted.clone()
    }

    /// Requests answered so far.
    pub fn requests(&self) -> Arc<AtomicUsize> {
        self.requests.clone()
    }

    /// Serve until the test's runtime shuts down. Every request gets `body`.
    pub fn start(self, body: &'static str) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(body).await })
    }

    async fn run(self, body: &'static str) {
        let local = self.socket.local_addr().unwrap();
        let mut config = server_config();
        let mut conns: Vec<ServerConn> = Vec::new();
        let mut buf = [0u8; 65535];
        let mut out = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            let wait = conns
                .iter()
                .filter_map(|c| c.conn.timeout())
                .min()
                .unwrap_or(Duration::from_millis(100));

            match timeout(wait, self.socket.recv_from(&mut buf)).await {
                Ok(Ok((len, from))) => {
                    let pkt = &mut buf[..len];
                    let (dcid, ty) = match quiche::Header::from_slice(pkt, SERVER_CID_LEN) {
                        Ok(hdr) => (hdr.dcid.to_vec(), hdr.ty),
                        Err(_) => continue,
                    };

                    let known = conns.iter().position(|c| c.scid == dcid || c.odcid == dcid);
                    let idx = match known {
                        Some(idx) => idx,
                        None if ty == quiche::Type::Initial => {
                            let mut scid = vec![0u8; SERVER_CID_LEN];
                            getrandom::fill(&mut scid).unwrap();
                            let cid = quiche::ConnectionId::from_ref(&scid);
                            let conn = match quiche::accept(&cid, None, local, from, &mut config) {
                                Ok(conn) => conn,
                                Err(_) => continue,
                            };
                            self.accepted.fetch_add(1, Ordering::SeqCst);
                            conns.push(ServerConn { scid, odcid: dcid, conn, h3: None });
                            conns.len() - 1
                        }
                        None => continue,
                    };

                    let c = &mut conns[idx];
                    let info = quiche::RecvInfo { from, to: local };
                    if let Err(e) = c.conn.recv(pkt, info) {
                        tracing::debug!("mock h3 recv error: {}", e);
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!("mock h3 socket error: {}", e);
                    return;
                }
                Err(_) => conns.iter_mut().for_each(|c| c.conn.on_timeout()),
            }

            for c in conns.iter_mut() {
                serve(c, body, &self.requests);
                while let Ok((len, send_info)) = c.conn.send(&mut out) {
                    let _ = self.socket.send_to(&out[..len], send_info.to).await;
                }
            }
            conns.retain(|c| !c.conn.is_closed());
        }
    }
}

fn server_config() -> quiche::Config {
    let (cert, key) = self_signed();
    let mut ctx = SslContextBuilder::new(SslMethod::tls()).unwrap();
    ctx.set_certificate(&cert).unwrap();
    ctx.set_private_key(&key).unwrap();

    let mut config =
        quiche::Config::with_boring_ssl_ctx_builder(quiche::PROTOCOL_VERSION, ctx).unwrap();
    config.set_application_protos(quiche::h3::APPLICATION_PROTOCOL).unwrap();
    config.set_max_idle_timeout(5_000);
    config.set_max_recv_udp_payload_size(65535);
    config.set_max_send_udp_payload_size(MAX_DATAGRAM_SIZE);
    config.set_initial_max_data(10_000_000);
    config.set_initial_max_stream_data_bidi_local(1_000_000);
    config.set_initial_max_stream_data_bidi_remote(1_000_000);
    config.set_initial_max_stream_data_uni(1_000_000);
    config.set_initial_max_streams_bidi(100);
    config.set_initial_max_streams_uni(100);
    config.set_disable_active_migration(true);
    config
}

/// Answer every request whose headers have arrived.
fn serve(c: &mut ServerConn, body: &'static str, requests: &AtomicUsize) {
    if c.h3.is_none() && c.conn.is_established() {
        let h3_config = quiche::h3::Config::new().unwrap();
        c.h3 = quiche::h3::Connection::with_transport(&mut c.conn, &h3_config).ok();
    }
    let Some(h3) = c.h3.as_mut() else {
        return;
    };

    loop {
        match h3.poll(&mut c.conn) {
            Ok((stream_id, quiche::h3::Event::Headers { .. })) => {
                requests.fetch_add(1, Ordering::SeqCst);
                let len = body.len().to_string();
                let headers = [
                    quiche::h3::Header::new(b":status", b"200"),
                    quiche::h3::Header::new(b"content-length", len.as_bytes()),
                ];
                let _ = h3.send_response(&mut c.conn, stream_id, &headers, false);
                let _ = h3.send_body(&mut c.conn, stream_id, body.as_bytes(), true);
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
}

