//! HTTP/3 connection driver - background task that feeds datagrams to the
//! QUIC connection and routes HTTP/3 events to streams.
//!
//! The driver owns the `quiche::Connection`, its route on the UDP socket and
//! a reference to the socket itself. It exits when every handle is dropped
//! or the connection closes, releasing all three.

use crate::base::neterror::NetError;
use crate::quic::socket::{QuicSocket, Route};
use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH};
use http::{HeaderMap, StatusCode};
use quiche::h3::NameValue;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, trace, warn};

pub(crate) const MAX_DATAGRAM_SIZE: usize = 1350;

/// H3_GENERAL_PROTOCOL_ERROR (RFC 9114 section 8.1).
const H3_GENERAL_PROTOCOL_ERROR: u64 = 0x101;
/// H3_REQUEST_CANCELLED, sent when we stop reading a response.
const H3_REQUEST_CANCELLED: u64 = 0x10c;

/// Command sent from handle to driver
#[derive(Debug)]
pub(crate) enum DriverCommand {
    /// Send a GET and report the response head via oneshot
    SendRequest {
        authority: String,
        path: String,
        headers: Vec<(String, String)>,
        /// Body bytes accepted before the stream is abandoned.
        max_body: Option<usize>,
        head_tx: oneshot::Sender<Result<H3ResponseHead, NetError>>,
    },
}

/// Final response headers. The body follows through [`H3Body`].
#[derive(Debug)]
pub struct H3ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: H3Body,
}

/// The rest of a response, delivered once the stream finishes.
#[derive(Debug)]
pub struct H3Body {
    rx: oneshot::Receiver<Result<Bytes, NetError>>,
}

impl H3Body {
    pub async fn collect(self) -> Result<Bytes, NetError> {
        self.rx.await.map_err(|_| NetError::ResponseBodyTruncated)?
    }
}

/// Per-stream state tracked by driver
struct DriverStreamState {
    /// Pending until the final (non-1xx) headers arrive
    head_tx: Option<oneshot::Sender<Result<H3ResponseHead, NetError>>>,
    body_tx: Option<oneshot::Sender<Result<Bytes, NetError>>>,
    body: BytesMut,
    content_length: Option<usize>,
    max_body: Option<usize>,
}

impl DriverStreamState {
    fn new(
        head_tx: oneshot::Sender<Result<H3ResponseHead, NetError>>,
        max_body: Option<usize>,
    ) -> Self {
        Self {
            head_tx: Some(head_tx),
            body_tx: None,
            body: BytesMut::new(),
            content_length: None,
            max_body,
        }
    }

    /// Buffer body bytes. Past `max_body` the body fails with
    /// `ResponseBodyTooLarge` and `false` is returned.
    fn push_body(&mut self, data: &[u8]) -> bool {
        if self.max_body.is_some_and(|max| self.body.len() + data.len() > max) {
            self.body.clear();
            if let Some(tx) = self.body_tx.take() {
                let _ = tx.send(Err(NetError::ResponseBodyTooLarge));
            } else if let Some(tx) = self.head_tx.take() {
                let _ = tx.send(Err(NetError::ResponseBodyTooLarge));
            }
            return false;
        }
        self.body.extend_from_slice(data);
        true
    }

    /// Fail whatever the caller is still waiting on. `before_head` is used if
    /// nothing arrived yet, `mid_body` once headers were delivered.
    fn fail(mut self, before_head: NetError, mid_body: NetError) {
        if let Some(tx) = self.head_tx.take() {
            let _ = tx.send(Err(before_head));
        } else if let Some(tx) = self.body_tx.take() {
            let _ = tx.send(Err(mid_body));
        }
    }

    fn finish(mut self) {
        if let Some(tx) = self.head_tx.take() {
            // Stream ended without a final :status.
            let _ = tx.send(Err(NetError::EmptyResponse));
            return;
        }
        let Some(tx) = self.body_tx.take() else {
            return;
        };
        let result = match self.content_length {
            Some(expected) if expected != self.body.len() => Err(NetError::ContentLengthMismatch),
            _ => Ok(self.body.freeze()),
        };
        let _ = tx.send(result);
    }
}

/// HTTP/3 connection driver
pub(crate) struct H3Driver {
    command_rx: mpsc::Receiver<DriverCommand>,
    conn: quiche::Connection,
    h3_conn: quiche::h3::Connection,
    socket: Arc<QuicSocket>,
    route: Route,
    peer_addr: SocketAddr,
    streams: HashMap<u64, DriverStreamState>,
}

impl H3Driver {
    pub fn new(
        command_rx: mpsc::Receiver<DriverCommand>,
        conn: quiche::Connection,
        h3_conn: quiche::h3::Connection,
        socket: Arc<QuicSocket>,
        route: Route,
        peer_addr: SocketAddr,
    ) -> Self {
        Self { command_rx, conn, h3_conn, socket, route, peer_addr, streams: HashMap::new() }
    }

    pub async fn drive(mut self) {
        let mut out = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            // 1. Flush whatever quiche generated
            if let Err(e) = flush_egress(&mut self.conn, &self.socket, &mut out).await {
                warn!(peer = %self.peer_addr, error = %e, "h3 driver send failed");
                self.fail_all();
                return;
            }

            if self.conn.is_closed() {
                debug!(
                    peer = %self.peer_addr,
                    peer_error = ?self.conn.peer_error(),
                    local_error = ?self.conn.local_error(),
                    timed_out = self.conn.is_timed_out(),
                    "quic connection closed"
                );
                self.fail_all();
                return;
            }

            // 2. Select: Command OR Packet OR Timer
            let timeout = self.conn.timeout().unwrap_or(Duration::from_secs(60));

            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        // Every handle is gone.
                        let _ = self.conn.close(true, 0x00, b"client shutdown");
                        let _ = flush_egress(&mut self.conn, &self.socket, &mut out).await;
                        self.fail_all();
                        return;
                    }
                },

                dgram = self.route.recv() => match dgram {
                    Some(mut dgram) => {
                        let info = quiche::RecvInfo { from: dgram.from, to: self.socket.local_addr() };
                        match self.conn.recv(&mut dgram.data, info) {
                            Ok(_) => self.process_h3_events(),
                            Err(quiche::Error::Done) => {}
                            Err(e) => warn!(peer = %self.peer_addr, error = %e, "quic recv error"),
                        }
                    }
                    None => {
                        debug!(peer = %self.peer_addr, "udp socket closed under connection");
                        self.fail_all();
                        return;
                    }
                },

                _ = sleep(timeout) => self.conn.on_timeout(),
            }
        }
    }

    fn handle_command(&mut self, cmd: DriverCommand) {
        match cmd {
            DriverCommand::SendRequest { authority, path, headers, max_body, head_tx } => {
                let mut h3_headers = vec![
                    quiche::h3::Header::new(b":method", b"GET"),
                    quiche::h3::Header::new(b":scheme", b"https"),
                    quiche::h3::Header::new(b":authority", authority.as_bytes()),
                    quiche::h3::Header::new(b":path", path.as_bytes()),
                ];
                for (k, v) in &headers {
                    let k = k.to_ascii_lowercase();
                    // Connection-specific headers are forbidden in HTTP/3.
                    if !k.starts_with(':')
                        && !matches!(
                            k.as_str(),
                            "connection" | "keep-alive" | "proxy-connection" | "transfer-encoding" | "upgrade"
                        )
                    {
                        h3_headers.push(quiche::h3::Header::new(k.as_bytes(), v.as_bytes()));
                    }
                }

                match self.h3_conn.send_request(&mut self.conn, &h3_headers, true) {
                    Ok(stream_id) => {
                        trace!(peer = %self.peer_addr, stream_id, %path, "h3 request sent");
                        self.streams.insert(stream_id, DriverStreamState::new(head_tx, max_body));
                    }
                    Err(e) => {
                        debug!(peer = %self.peer_addr, error = %e, "h3 send_request failed");
                        let _ = head_tx.send(Err(NetError::QuicProtocolError));
                    }
                }
            }
        }
    }

    fn process_h3_events(&mut self) {
        loop {
            match self.h3_conn.poll(&mut self.conn) {
                Ok((stream_id, quiche::h3::Event::Headers { list, .. })) => {
                    if let Some(stream) = self.streams.get_mut(&stream_id) {
                        on_headers(stream, &list);
                    }
                }
                Ok((stream_id, quiche::h3::Event::Data)) => self.read_body(stream_id),
                Ok((stream_id, quiche::h3::Event::Finished)) => {
                    if let Some(stream) = self.streams.remove(&stream_id) {
                        trace!(peer = %self.peer_addr, stream_id, "h3 stream finished");
                        stream.finish();
                    }
                }
                Ok((stream_id, quiche::h3::Event::Reset(error_code))) => {
                    if let Some(stream) = self.streams.remove(&stream_id) {
                        debug!(peer = %self.peer_addr, stream_id, error_code, "h3 stream reset");
                        stream.fail(NetError::QuicProtocolError, NetError::ResponseBodyTruncated);
                    }
                }
                Ok(_) => {} // GoAway, PriorityUpdate
                Err(quiche::h3::Error::Done) => break,
                Err(e) => {
                    warn!(peer = %self.peer_addr, error = %e, "h3 poll error");
                    let _ = self.conn.close(true, H3_GENERAL_PROTOCOL_ERROR, b"h3 error");
                    break;
                }
            }
        }
    }

    fn read_body(&mut self, stream_id: u64) {
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            // Abandoned or unknown; drain so the stream can finish.
            let mut buf = [0u8; 4096];
            while self.h3_conn.recv_body(&mut self.conn, stream_id, &mut buf).is_ok() {}
            return;
        };
        let mut buf = vec![0u8; 65535];
        while let Ok(len) = self.h3_conn.recv_body(&mut self.conn, stream_id, &mut buf) {
            if !stream.push_body(&buf[..len]) {
                debug!(peer = %self.peer_addr, stream_id, "h3 body over limit");
                self.streams.remove(&stream_id);
                let _ = self.conn.stream_shutdown(
                    stream_id,
                    quiche::Shutdown::Read,
                    H3_REQUEST_CANCELLED,
                );
                return;
            }
        }
    }

    fn fail_all(&mut self) {
        for (_, stream) in self.streams.drain() {
            stream.fail(NetError::EmptyResponse, NetError::ResponseBodyTruncated);
        }
    }
}

fn on_headers(stream: &mut DriverStreamState, list: &[quiche::h3::Header]) {
    let Some(head_tx) = stream.head_tx.take() else {
        // Trailers.
        return;
    };

    let mut status = None;
    let mut headers = HeaderMap::new();
    for header in list {
        if header.name() == b":status" {
            status = std::str::from_utf8(header.value())
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .and_then(|v| StatusCode::from_u16(v).ok());
        } else if let (Ok(name), Ok(value)) =
            (HeaderName::from_bytes(header.name()), HeaderValue::from_bytes(header.value()))
        {
            headers.append(name, value);
        }
    }

    match status {
        Some(status) if status.is_informational() => {
            stream.head_tx = Some(head_tx);
        }
        Some(status) => {
            stream.content_length = headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let (body_tx, rx) = oneshot::channel();
            stream.body_tx = Some(body_tx);
            let _ = head_tx.send(Ok(H3ResponseHead { status, headers, body: H3Body { rx } }));
        }
        None => {
            // Keep waiting; finishing without :status reports an empty response.
            stream.head_tx = Some(head_tx);
        }
    }
}

/// Send every packet quiche has queued.
pub(crate) async fn flush_egress(
    conn: &mut quiche::Connection,
    socket: &QuicSocket,
    out: &mut [u8],
) -> Result<(), NetError> {
    loop {
        match conn.send(out) {
            Ok((len, send_info)) => {
                socket.send_to(&out[..len], send_info.to).await.map_err(|e| {
                    debug!(peer = %send_info.to, error = %e, "udp send failed");
                    NetError::ConnectionFailed
                })?;
            }
            Err(quiche::Error::Done) => return Ok(()),
            Err(e) => {
                debug!(error = %e, "quiche send error");
                return Err(NetError::QuicProtocolError);
            }
        }
    }
}
