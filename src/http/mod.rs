pub mod altsvc;
pub mod protocol;
pub mod response;
pub mod streamfactory;
pub mod transaction;

// Re-exports for convenience
pub use altsvc::{parse_alt_svc, AltService};
pub use protocol::Protocol;
pub use response::{ConnectTiming, LoadTiming, RequestResult};
pub use streamfactory::{HttpStream, HttpStreamFactory, ResponseHead};
pub use transaction::HttpNetworkTransaction;
