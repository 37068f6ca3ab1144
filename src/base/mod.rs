//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): network error codes in the Chromium numbering
//! - [`LoadState`](loadstate::LoadState): where a transaction currently is
//! - [`TargetEndpoint`](endpoint::TargetEndpoint): host, port and SNI for a URL
//! - [`Deadline`](deadline::Deadline): timeout plus cancellation signal

pub mod context;
pub mod deadline;
pub mod endpoint;
pub mod loadstate;
pub mod neterror;

#[cfg(test)]
mod tests;
