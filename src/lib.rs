//! # dialscope
//!
//! A small HTTP client with pluggable transports and connection
//! observability.
//!
//! The same `GET` can be sent over TCP+TLS, QUIC with a socket per dial,
//! or QUIC over one shared UDP socket. Each dial reports its milestones
//! (`DialStarted`, `Connected`, `HandshakeDone`) to a
//! [`ConnectionObserver`], so callers learn which peer address actually
//! answered and which protocol ALPN picked.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dialscope::{Deadline, HttpClient, NullObserver, TargetEndpoint, Transport, TransportVariant};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = HttpClient::new();
//!     let transport = Transport::new(TransportVariant::QuicDefault, &Default::default());
//!     let endpoint = TargetEndpoint::parse("https://cloudflare-quic.com/").unwrap();
//!     let result = client
//!         .send(&transport, &endpoint, &NullObserver, &Deadline::after(std::time::Duration::from_secs(5)))
//!         .await;
//!     println!("{:?} {:?}", result.status, result.protocol);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Errors, endpoints and deadlines
//! - [`dns`] - Pluggable name resolution
//! - [`observer`] - Connection lifecycle events
//! - [`socket`] - Dialer seam, TCP+TLS and connection pooling
//! - [`quic`] - QUIC dialing and HTTP/3 on quiche
//! - [`http`] - Streams, transactions and results
//! - [`client`] - The request facade
//! - [`driver`] - Sequential per-variant runs and reporting

pub mod base;
pub mod client;
pub mod dns;
pub mod driver;
pub mod http;
pub mod observer;
pub mod quic;
pub mod socket;

pub use base::deadline::{Canceller, Deadline};
pub use base::endpoint::{Scheme, TargetEndpoint};
pub use base::neterror::{ErrorKind, NetError};
pub use client::{ClientBuilder, ClientConfig, HttpClient};
pub use driver::{DriverConfig, RequestDriver, RunSummary, VariantReport};
pub use http::{Protocol, RequestResult};
pub use observer::{ChannelObserver, ConnectionEvent, ConnectionObserver, EventKind, NullObserver};
pub use socket::tls::TlsConfig;
pub use socket::transport::{Dialer, Transport, TransportOptions, TransportVariant};
