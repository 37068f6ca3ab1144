//! DNS Resolution Module
//!
//! Provides pluggable DNS resolution with support for:
//! - System resolver (getaddrinfo via thread pool)
//! - Async hickory-dns resolver
//! - Hostname-to-IP override mechanism
//! - Family ordering for dialers ([`AddrPreference`])
//!
//! # Example
//!
//! ```rust,ignore
//! use dialscope::dns::{lookup_endpoint, AddrPreference, GaiResolver};
//!
//! let addrs = lookup_endpoint(&GaiResolver::new(), &endpoint, AddrPreference::Ipv4First).await?;
//! ```

mod gai;
mod hickory;
mod lookup;
mod resolve;

pub use gai::GaiResolver;
pub use hickory::HickoryResolver;
pub use lookup::{lookup_endpoint, AddrPreference};
pub use resolve::{Addrs, DnsResolverWithOverrides, Name, Resolve, Resolving};
