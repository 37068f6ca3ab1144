//! HTTP/3 connection handle - non-blocking interface for sending requests.
//!
//! The handle sends commands to a driver task and receives responses via channels.
//! Clones share the same driver, so requests on them are multiplexed.

use crate::base::neterror::NetError;
use crate::quic::driver::{DriverCommand, H3ResponseHead};
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};

/// HTTP/3 connection handle for sending requests
#[derive(Debug, Clone)]
pub struct H3Handle {
    /// Channel for sending commands to the driver
    command_tx: mpsc::Sender<DriverCommand>,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl H3Handle {
    pub(crate) fn new(
        command_tx: mpsc::Sender<DriverCommand>,
        remote_addr: SocketAddr,
        local_addr: SocketAddr,
    ) -> Self {
        Self { command_tx, remote_addr, local_addr }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The driver has exited; no more requests can be sent.
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Send a GET and wait for the final response headers.
    /// The body is read separately through [`H3ResponseHead::body`]; the
    /// driver stops reading it past `max_body` bytes.
    pub async fn get(
        &self,
        authority: &str,
        path: &str,
        headers: Vec<(String, String)>,
        max_body: Option<usize>,
    ) -> Result<H3ResponseHead, NetError> {
        let (head_tx, head_rx) = oneshot::channel();
        let command = DriverCommand::SendRequest {
            authority: authority.to_string(),
            path: path.to_string(),
            headers,
            max_body,
            head_tx,
        };

        self.command_tx.send(command).await.map_err(|_| NetError::ConnectionClosed)?;

        // A dropped sender means the driver died before answering.
        head_rx.await.map_err(|_| NetError::EmptyResponse)?
    }
}
