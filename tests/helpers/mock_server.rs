use boring::ssl::SslAcceptor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::timeout;

use super::tls::http1_acceptor;

/// How the mock server answers every request.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Reply {
    /// `200 OK` with `body`, keep-alive, plus extra header lines.
    Ok { body: &'static str, headers: Vec<(&'static str, &'static str)> },
    /// Declares `declared` body bytes, sends `body`, then closes.
    Truncated { declared: usize, body: &'static str },
    /// Reads the request and closes without answering.
    Close,
}

#[allow(dead_code)]
impl Reply {
    pub fn hello() -> Self {
        Reply::Ok { body: "Hello", headers: Vec::new() }
    }
}

/// A small HTTP/1.1 server on a random local port, optionally behind TLS.
pub struct MockHttpServer {
    listener: TcpListener,
    port: u16,
    accepted: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
    tls: Option<Arc<SslAcceptor>>,
}

#[allow(dead_code)]
impl MockHttpServer {
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            accepted: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(AtomicUsize::new(0)),
            tls: None,
        })
    }

    /// Serve over TLS with a self-signed certificate.
    pub fn with_tls(mut self) -> Self {
        self.tls = Some(Arc::new(http1_acceptor()));
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        let scheme = if self.tls.is_some() { "https" } else { "http" };
        format!("{scheme}://127.0.0.1:{}/", self.port)
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> Arc<AtomicUsize> {
        self.accepted.clone()
    }

    /// Requests answered so far.
    pub fn requests(&self) -> Arc<AtomicUsize> {
        self.requests.clone()
    }

    pub fn start(self, reply: Reply) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, _)) => {
                        self.accepted.fetch_add(1, Ordering::SeqCst);
                        let reply = reply.clone();
                        let requests = self.requests.clone();
                        match self.tls.clone() {
                            None => {
                                tokio::spawn(handle_connection(stream, reply, requests));
                            }
                            Some(acceptor) => {
                                tokio::spawn(async move {
                                    match tokio_boring::accept(&acceptor, stream).await {
                                        Ok(tls) => handle_connection(tls, reply, requests).await,
                                        Err(e) => tracing::debug!("tls accept failed: {}", e),
                                    }
                                });
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                        break;
                    }
                }
            }
        })
    }
}

/// Read one request head. `false` when the peer went away first.
async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> bool {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = match timeout(Duration::from_secs(5), stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => return false,
            Ok(Ok(n)) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            return true;
        }
    }
}

async fn handle_connection<S>(mut stream: S, reply: Reply, requests: Arc<AtomicUsize>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while read_request(&mut stream).await {
        requests.fetch_add(1, Ordering::SeqCst);
        match &reply {
            Reply::Ok { body, headers } => {
                let mut head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: keep-alive\r\n",
                    body.len()
                );
                for (name, value) in headers {
                    head.push_str(&format!("{name}: {value}\r\n"));
                }
                head.push_str("\r\n");
                if stream.write_all(head.as_bytes()).await.is_err()
                    || stream.write_all(body.as_bytes()).await.is_err()
                {
                    return;
                }
            }
            Reply::Truncated { declared, body } => {
                let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\n\r\n{body}");
                let _ = stream.write_all(head.as_bytes()).await;
                let _ = stream.shutdown().await;
                return;
            }
            Reply::Close => return,
        }
    }
}

/// A UDP socket that swallows everything: a QUIC peer that never answers.
#[allow(dead_code)]
pub async fn silent_udp_peer() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

/// A local port with nothing listening on it.
#[allow(dead_code)]
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
