//! MCP server engine (§4.5-4.8): the capability registry, session
//! manager, hooks/middleware, and the dispatch engine tying them
//! together.

pub mod context;
pub mod error;
pub mod hooks;
pub mod registry;
pub mod server;
pub mod session;

pub use context::RequestContext;
pub use error::{ServerError, ServerResult};
pub use hooks::{Family, Hooks, MiddlewareStacks};
pub use registry::{text_result, PromptHandler, Registry, ResourceHandler, ToolHandler};
pub use server::{McpServer, ServerConfig};
pub use session::{Session, SessionManager};
