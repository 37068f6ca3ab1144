pub mod mock_h3_server;
pub mod mock_server;
pub mod tls;
