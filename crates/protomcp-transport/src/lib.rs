//! Transport abstraction and the four concrete MCP transports (§4.2):
//! stdio, SSE, streamable-HTTP, and in-process.

pub mod error;
pub mod in_process;
pub mod sse;
pub mod stdio;
pub mod streamable_http;
pub mod traits;

pub use error::{TransportError, TransportResult};
pub use in_process::InProcessTransport;
pub use sse::{SseConfig, SseTransport};
pub use stdio::StdioTransport;
pub use streamable_http::{StreamableHttpConfig, StreamableHttpTransport};
pub use traits::{StartContext, Transport, TransportKind, TransportState};
