// ledgerlink-api: transport layer for the ledgerlink ERP backend (REST + WebSocket)

pub mod client;
pub mod error;
pub mod probe;
pub mod transport;
pub mod websocket;

pub use client::ApiClient;
pub use error::Error;
pub use probe::{Prober, Reachability};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{InboundMessage, OutboundMessage, SessionEnd};
