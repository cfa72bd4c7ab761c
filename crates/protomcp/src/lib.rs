//! # protomcp - a Model Context Protocol engine
//!
//! Wires together the four pieces of an MCP peer: the [`protomcp_core`]
//! wire codec, [`protomcp_transport`]'s four transports (stdio, SSE,
//! streamable-HTTP, in-process), [`protomcp_client::Client`]'s request
//! correlation, and [`protomcp_server::McpServer`]'s capability dispatch.
//!
//! ```no_run
//! use protomcp::prelude::*;
//!
//! # async fn run() -> protomcp_client::ClientResult<()> {
//! let (client_transport, server_transport) = InProcessTransport::pair();
//! let client = Client::new(
//!     Arc::new(client_transport),
//!     Implementation { name: "demo".into(), version: "0.1.0".into() },
//! );
//!
//! let server = Arc::new(McpServer::new(
//!     ServerConfig::default(),
//!     Hooks::new(),
//!     MiddlewareStacks::new(),
//! ));
//! server.registry.add_tool(
//!     Tool { name: "echo".into(), description: None, input_schema: serde_json::json!({}), annotations: None },
//!     Arc::new(|args: Option<std::collections::HashMap<String, serde_json::Value>>, _ctx: RequestContext| async move {
//!         Ok(text_result(args.and_then(|a| a.get("text").cloned()).map(|v| v.to_string()).unwrap_or_default()))
//!     }),
//! );
//! tokio::spawn({
//!     let server = server.clone();
//!     async move { server.serve_connection(Arc::new(server_transport)).await; }
//! });
//!
//! client.initialize().await?;
//! # Ok(())
//! # }
//! ```

pub use protomcp_client as client;
pub use protomcp_core as core;
pub use protomcp_server as server;
pub use protomcp_transport as transport;

/// Commonly-combined imports for building a peer.
pub mod prelude {
    pub use protomcp_client::{Client, ClientConfig, ClientError, ClientResult, Correlator};
    pub use protomcp_core::types::*;
    pub use protomcp_core::{CancellationToken, Error as CoreError, ErrorKind, Frame, Message};
    pub use protomcp_server::{
        text_result, Hooks, McpServer, MiddlewareStacks, Registry, RequestContext, ServerConfig,
        Session,
    };
    pub use protomcp_transport::{
        InProcessTransport, SseConfig, SseTransport, StdioTransport, StreamableHttpConfig,
        StreamableHttpTransport, Transport,
    };
    pub use std::sync::Arc;
}
