//! MCP client engine (§4.4): the request correlator (§4.3) plus the typed
//! operations and handshake logic layered on top of it.

pub mod client;
pub mod correlator;
pub mod error;

pub use client::{Client, ClientConfig, DEFAULT_TIMEOUT};
pub use correlator::{Correlator, NotificationHandler, ServerRequestHandler};
pub use error::{ClientError, ClientResult};
