use crate::base::deadline::Deadline;
use crate::base::endpoint::TargetEndpoint;
use crate::base::neterror::NetError;
use crate::http::{ConnectTiming, Protocol};
use crate::observer::ConnectionObserver;
use crate::quic::{H3Body, H3Handle};
use crate::socket::pool::{ConnectionPool, PoolKey, PooledStream};
use crate::socket::transport::{Connection, Transport};
use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{HeaderMap, Request, StatusCode};
use http_body_util::{BodyExt, Empty, Limited};
use hyper::body::Incoming;
use hyper::client::conn::{http1, http2};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::sync::Arc;
use tokio::spawn;
use tracing::debug;

/// Wraps the underlying protocol stream (H1/H2/H3).
/// Equivalent to net::HttpStream.
#[derive(Debug)]
pub enum HttpStream {
    Http1(http1::SendRequest<Empty<Bytes>>),
    Http2(http2::SendRequest<Empty<Bytes>>),
    Http3(H3Handle),
}

/// Status and headers of a response whose body has not been read yet.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

#[derive(Debug)]
pub struct ResponseBody(BodyInner);

#[derive(Debug)]
enum BodyInner {
    Hyper(Incoming),
    H3(H3Body),
}

impl ResponseBody {
    /// Read the whole body, failing if it exceeds `limit` bytes.
    pub async fn collect(self, limit: Option<usize>) -> Result<Bytes, NetError> {
        let body = match self.0 {
            BodyInner::Hyper(incoming) => match limit {
                Some(limit) => Limited::new(incoming, limit)
                    .collect()
                    .await
                    .map_err(|e| {
                        if e.is::<http_body_util::LengthLimitError>() {
                            NetError::ResponseBodyTooLarge
                        } else {
                            debug!(error = %e, "body read failed");
                            NetError::ResponseBodyTruncated
                        }
                    })?
                    .to_bytes(),
                None => incoming
                    .collect()
                    .await
                    .map_err(|e| {
                        debug!(error = %e, "body read failed");
                        NetError::ResponseBodyTruncated
                    })?
                    .to_bytes(),
            },
            BodyInner::H3(body) => body.collect().await?,
        };
        match limit {
            Some(limit) if body.len() > limit => Err(NetError::ResponseBodyTooLarge),
            _ => Ok(body),
        }
    }
}

impl HttpStream {
    pub fn protocol(&self) -> Protocol {
        match self {
            HttpStream::Http1(_) => Protocol::Http1,
            HttpStream::Http2(_) => Protocol::Http2,
            HttpStream::Http3(_) => Protocol::Http3,
        }
    }

    /// Whether more than one request may use the connection at once.
    pub fn is_multiplexed(&self) -> bool {
        !matches!(self, HttpStream::Http1(_))
    }

    /// The connection is still open and can take another request.
    pub fn is_reusable(&self) -> bool {
        match self {
            HttpStream::Http1(s) => !s.is_closed(),
            HttpStream::Http2(s) => !s.is_closed(),
            HttpStream::Http3(h) => !h.is_closed(),
        }
    }

    /// A second handle on a multiplexed connection. `None` for HTTP/1.1.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            HttpStream::Http1(_) => None,
            HttpStream::Http2(s) => Some(HttpStream::Http2(s.clone())),
            HttpStream::Http3(h) => Some(HttpStream::Http3(h.clone())),
        }
    }

    /// Send `GET endpoint.path()` with an empty body and wait for the
    /// response headers. `max_body` bounds what HTTP/3 buffers; hyper
    /// bodies are bounded in [`ResponseBody::collect`].
    pub async fn get(
        &mut self,
        endpoint: &TargetEndpoint,
        user_agent: &str,
        max_body: Option<usize>,
    ) -> Result<ResponseHead, NetError> {
        let authority = endpoint.authority();
        let version = self.protocol().version();
        match self {
            HttpStream::Http1(sender) => {
                let req = Request::get(endpoint.path())
                    .version(version)
                    .header(HOST, &authority)
                    .header(USER_AGENT, user_agent)
                    .body(Empty::new())
                    .map_err(|_| NetError::InvalidUrl)?;
                sender.ready().await.map_err(map_hyper_error)?;
                let resp = sender.send_request(req).await.map_err(map_hyper_error)?;
                Ok(hyper_head(resp))
            }
            HttpStream::Http2(sender) => {
                let uri = format!("{}://{}{}", endpoint.scheme().as_str(), authority, endpoint.path());
                let req = Request::get(uri)
                    .version(version)
                    .header(USER_AGENT, user_agent)
                    .body(Empty::new())
                    .map_err(|_| NetError::InvalidUrl)?;
                sender.ready().await.map_err(map_hyper_error)?;
                let resp = sender.send_request(req).await.map_err(|e| {
                    if e.is_incomplete_message() || e.is_closed() || e.is_canceled() {
                        map_hyper_error(e)
                    } else {
                        debug!(error = %e, "h2 request failed");
                        NetError::Http2ProtocolError
                    }
                })?;
                Ok(hyper_head(resp))
            }
            HttpStream::Http3(handle) => {
                let head = handle
                    .get(
                        &authority,
                        endpoint.path(),
                        vec![("user-agent".into(), user_agent.into())],
                        max_body,
                    )
                    .await?;
                Ok(ResponseHead {
                    status: head.status,
                    headers: head.headers,
                    body: ResponseBody(BodyInner::H3(head.body)),
                })
            }
        }
    }
}

fn hyper_head(resp: http::Response<Incoming>) -> ResponseHead {
    let (parts, body) = resp.into_parts();
    ResponseHead { status: parts.status, headers: parts.headers, body: ResponseBody(BodyInner::Hyper(body)) }
}

fn map_hyper_error(e: hyper::Error) -> NetError {
    debug!(error = %e, "hyper request failed");
    if e.is_incomplete_message() {
        // Peer closed before sending any response.
        NetError::EmptyResponse
    } else if e.is_parse() || e.is_parse_status() {
        NetError::InvalidResponse
    } else if e.is_canceled() || e.is_closed() {
        NetError::ConnectionClosed
    } else if e.is_timeout() {
        NetError::TimedOut
    } else {
        NetError::ConnectionReset
    }
}

/// Where a stream came from.
#[derive(Debug)]
pub struct StreamInfo {
    pub reused: bool,
    /// Only for freshly dialed connections.
    pub connect: Option<ConnectTiming>,
}

/// Hands out HTTP streams: from the pool when possible, otherwise by
/// dialing through the transport and running the HTTP handshake.
pub struct HttpStreamFactory {
    pool: Arc<ConnectionPool>,
}

impl HttpStreamFactory {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub async fn request_stream(
        &self,
        transport: &Transport,
        endpoint: &TargetEndpoint,
        observer: &dyn ConnectionObserver,
        deadline: &Deadline,
        reuse: bool,
    ) -> Result<(PooledStream, StreamInfo), NetError> {
        if reuse {
            let key = PoolKey::new(transport.variant(), endpoint, transport.tls());
            if let Some(pooled) = self.pool.take(&key) {
                debug!(remote = %pooled.remote_addr, protocol = %pooled.stream.protocol(), "reusing pooled connection");
                return Ok((pooled, StreamInfo { reused: true, connect: None }));
            }
        }

        let dialed = transport.dial(endpoint, observer, deadline).await?;
        let stream = Self::handshake(dialed.connection, dialed.protocol).await?;
        let pooled = PooledStream {
            stream,
            remote_addr: dialed.remote_addr,
            local_addr: dialed.local_addr,
        };
        Ok((pooled, StreamInfo { reused: false, connect: Some(dialed.timing) }))
    }

    /// Layer HTTP on a transport connection according to its ALPN.
    pub async fn handshake(connection: Connection, protocol: Protocol) -> Result<HttpStream, NetError> {
        if let Connection::Stream(socket) = &connection {
            debug!(peer = ?socket.peer_addr(), local = ?socket.local_addr(), %protocol, "starting http handshake");
        }
        match (connection, protocol) {
            (Connection::Quic(handle), _) => Ok(HttpStream::Http3(handle)),
            (Connection::Stream(socket), Protocol::Http2) => {
                let io = TokioIo::new(socket);
                let (sender, conn) = http2::handshake(TokioExecutor::new(), io).await.map_err(|e| {
                    debug!(error = %e, "h2 handshake failed");
                    NetError::Http2ProtocolError
                })?;
                spawn(async move {
                    if let Err(e) = conn.await {
                        debug!(error = %e, "h2 connection ended");
                    }
                });
                Ok(HttpStream::Http2(sender))
            }
            (Connection::Stream(socket), _) => {
                let io = TokioIo::new(socket);
                let (sender, conn) = http1::handshake(io).await.map_err(|e| {
                    debug!(error = %e, "h1 handshake failed");
                    NetError::ConnectionFailed
                })?;
                spawn(async move {
                    if let Err(e) = conn.await {
                        debug!(error = %e, "h1 connection ended");
                    }
                });
                Ok(HttpStream::Http1(sender))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_request_version_follows_protocol() {
        assert_eq!(Protocol::Http1.version(), http::Version::HTTP_11);
        assert_eq!(Protocol::Http2.version(), http::Version::HTTP_2);
        assert_eq!(Protocol::Http3.version(), http::Version::HTTP_3);
    }

    #[test]
    fn test_request_host_header_value() {
        let ep = TargetEndpoint::parse("http://[::1]:8080/x").unwrap();
        assert!(HeaderValue::from_str(&ep.authority()).is_ok());
    }
}
