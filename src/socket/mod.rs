//! Sockets, dialers and connection reuse.
//!
//! Mirrors the shape of Chromium's `net/socket/`:
//! - [`transport`]: the [`Dialer`](transport::Dialer) seam and [`Transport`](transport::Transport) variants
//! - [`tcp`]: DNS → TCP → TLS connection flow
//! - [`tls`]: TLS configuration with BoringSSL
//! - [`pool`]: idle and multiplexed connection reuse

pub mod client;
pub mod pool;
pub mod tcp;
pub mod tls;
pub mod transport;
