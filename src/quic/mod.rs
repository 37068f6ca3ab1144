//! QUIC and HTTP/3 support.
//!
//! Provides QUIC transport and HTTP/3 using quiche on BoringSSL.
//! Mirrors Chromium's net/quic/ implementation pattern:
//! - [`QuicDialer`]: resolve, pick a UDP socket, handshake
//! - [`SharedSocketHandle`]: one lazily bound socket for many connections
//! - [`H3Handle`]: cloneable request handle backed by a driver task
//!
//! # Example
//! ```ignore
//! use dialscope::quic::{QuicDialer, SocketMode};
//!
//! let dialer = QuicDialer::new(SocketMode::Shared, QuicConfig::default(), resolver, pref);
//! let conn = dialer.dial(&endpoint, &tls, &NullObserver, &deadline).await?;
//! ```

mod config;
mod connection;
mod dialer;
mod driver;
mod handle;
mod socket;

pub use config::QuicConfig;
pub use connection::QuicConnection;
pub use dialer::{QuicDialer, SocketMode};
pub use driver::{H3Body, H3ResponseHead};
pub use handle::H3Handle;
pub use socket::{QuicSocket, SharedSocketHandle};
