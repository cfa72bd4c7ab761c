//! The server engine (§4.5): dispatches inbound requests to the
//! capability registry via a static method table, fires hooks around each
//! dispatch, and fans notifications out to sessions.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use protomcp_core::types::*;
use protomcp_core::{method, Frame, Message, Notification, Request, Response};
use protomcp_transport::{StartContext, Transport};
use tracing::{info_span, warn, Instrument};

use crate::context::RequestContext;
use crate::error::ServerError;
use crate::hooks::{Family, Hooks, MiddlewareStacks};
use crate::registry::Registry;
use crate::session::{Session, SessionManager};

/// Plain configuration knobs for the server engine (§ ambient config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_info: Implementation,
    pub protocol_version: String,
    pub handler_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_info: Implementation {
                name: "protomcp-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            protocol_version: PROTOCOL_VERSION.to_string(),
            handler_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// The server-side MCP engine: one instance serves any number of
/// concurrently-connected sessions.
pub struct McpServer {
    pub registry: Arc<Registry>,
    pub sessions: Arc<SessionManager>,
    hooks: Arc<Hooks>,
    middleware: Arc<MiddlewareStacks>,
    config: ServerConfig,
}

impl McpServer {
    #[must_use]
    pub fn new(config: ServerConfig, hooks: Hooks, middleware: MiddlewareStacks) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            sessions: Arc::new(SessionManager::new()),
            hooks: Arc::new(hooks),
            middleware: Arc::new(middleware),
            config,
        }
    }

    /// Accept a new connection: start the transport, register a session,
    /// and spawn the task that pumps inbound frames to [`Self::dispatch`].
    pub async fn serve_connection(self: &Arc<Self>, transport: Arc<dyn Transport>) -> Arc<Session> {
        let _ = transport.start(StartContext::default()).await;
        let session = self.sessions.register(transport.clone());
        self.hooks.fire_session_register(&session);

        let Some(mut rx) = transport.take_receiver() else {
            warn!("serve_connection: transport receiver already taken");
            return session;
        };
        let this = self.clone();
        let session_for_task = session.clone();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                this.clone().handle_frame(session_for_task.clone(), frame).await;
            }
            this.sessions.unregister(&session_for_task.id);
            this.hooks.fire_session_unregister(&session_for_task);
        });
        session
    }

    async fn handle_frame(self: Arc<Self>, session: Arc<Session>, frame: Frame) {
        match frame {
            Frame::Single(m) => self.handle_message(session, m).await,
            Frame::Batch(items) => {
                for m in items {
                    self.clone().handle_message(session.clone(), m).await;
                }
            }
        }
    }

    async fn handle_message(self: Arc<Self>, session: Arc<Session>, message: Message) {
        match message {
            Message::Request(req) => {
                // Spawned rather than awaited inline: a suspended handler must
                // not block the pump from reading the next frame, since that
                // next frame may be the `$/cancelled` notification meant to
                // wake it up (§4.3, §5, §8 scenario 3).
                let this = self.clone();
                tokio::spawn(async move {
                    let response = this.dispatch(&session, req).await;
                    let _ = session
                        .transport
                        .send(Frame::Single(Message::Response(response)))
                        .await;
                });
            }
            Message::Notification(note) if note.method == method::CANCELLED => {
                if let Ok(params) = serde_json::from_value::<CancelledParams>(
                    note.params.unwrap_or(serde_json::Value::Null),
                ) {
                    session.cancel_in_flight(&params.request_id);
                }
            }
            Message::Notification(_) => {
                // No other inbound notifications are meaningful server-side.
            }
            Message::Response(_) => {
                // Only meaningful if this server also plays client (sampling);
                // out of this core's scope, dropped per §4.3 stale-response rule.
            }
        }
    }

    /// Dispatch one request through the pipeline described in §4.5:
    /// before-any hooks, registry lookup under a read path, handler
    /// invocation with a session-scoped, cancellable context, after-any /
    /// on-error hooks, then encode the result.
    pub async fn dispatch(self: &Arc<Self>, session: &Arc<Session>, req: Request) -> Response {
        let span = info_span!("dispatch", session = %session.id, method = %req.method, id = %req.id);
        async move {
            let id = req.id.clone();
            let cancellation = session.register_in_flight(id.clone());
            let ctx = RequestContext::new(session.id.clone(), cancellation.clone());

            let family = family_for(&req.method);
            self.hooks.fire_before(family, &req.method, &ctx);

            let result = self.run_with_recovery(session, &req, &ctx, family).await;

            self.hooks.fire_after(family, &req.method, &ctx);
            session.complete_in_flight(&id);

            match result {
                Ok(value) => Response::success(id, value),
                Err(e) => {
                    self.hooks.fire_error(&req.method, &e.0);
                    Response::error(Some(id), (&e.0).into())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_with_recovery(
        self: &Arc<Self>,
        session: &Arc<Session>,
        req: &Request,
        ctx: &RequestContext,
        family: Family,
    ) -> Result<serde_json::Value, ServerError> {
        let fut = self.route(session, req, ctx, family);
        let guarded = match self.config.handler_timeout {
            Some(d) => {
                let timed = tokio::time::timeout(d, AssertUnwindSafe(fut).catch_unwind());
                match timed.await {
                    Ok(r) => r,
                    Err(_) => return Err(ServerError(protomcp_core::Error::timeout())),
                }
            }
            None => AssertUnwindSafe(fut).catch_unwind().await,
        };
        match guarded {
            Ok(inner) => inner,
            Err(_panic) => Err(ServerError(protomcp_core::Error::internal(
                "handler panicked",
            ))),
        }
    }

    async fn route(
        self: &Arc<Self>,
        session: &Arc<Session>,
        req: &Request,
        ctx: &RequestContext,
        _family: Family,
    ) -> Result<serde_json::Value, ServerError> {
        match req.method.as_str() {
            method::INITIALIZE => self.handle_initialize(session, req).await,
            method::PING => Ok(serde_json::json!({})),
            method::TOOLS_LIST => self.handle_tools_list(req),
            method::TOOLS_CALL => self.handle_tools_call(req, ctx).await,
            method::RESOURCES_LIST => self.handle_resources_list(req),
            method::RESOURCES_TEMPLATES_LIST => self.handle_resource_templates_list(),
            method::RESOURCES_READ => self.handle_resources_read(req, ctx).await,
            method::RESOURCES_SUBSCRIBE => self.handle_subscribe(session, req),
            method::RESOURCES_UNSUBSCRIBE => self.handle_unsubscribe(session, req),
            method::PROMPTS_LIST => self.handle_prompts_list(req),
            method::PROMPTS_GET => self.handle_prompts_get(req, ctx).await,
            method::LOGGING_SET_LEVEL => Ok(serde_json::json!({})),
            method::COMPLETION_COMPLETE => Ok(serde_json::to_value(CompleteResult {
                completion: CompleteCompletion {
                    values: Vec::new(),
                    total: Some(0),
                    has_more: Some(false),
                },
            })
            .expect("CompleteResult always serializes")),
            other => Err(ServerError(protomcp_core::Error::method_not_found(other))),
        }
    }

    async fn handle_initialize(
        &self,
        session: &Arc<Session>,
        req: &Request,
    ) -> Result<serde_json::Value, ServerError> {
        let params: InitializeParams = parse_params(req)?;
        *session.protocol_version.lock() = params.protocol_version.clone();
        *session.client_capabilities.lock() = params.capabilities;

        let result = InitializeResult {
            protocol_version: self.config.protocol_version.clone(),
            capabilities: ServerCapabilities {
                tools: Some(ListChangedCapability { list_changed: Some(true) }),
                resources: Some(ResourcesCapability {
                    subscribe: Some(true),
                    list_changed: Some(true),
                }),
                prompts: Some(ListChangedCapability { list_changed: Some(true) }),
                logging: Some(serde_json::json!({})),
                completions: Some(serde_json::json!({})),
            },
            server_info: self.config.server_info.clone(),
        };
        Ok(serde_json::to_value(result).expect("InitializeResult always serializes"))
    }

    fn handle_tools_list(&self, req: &Request) -> Result<serde_json::Value, ServerError> {
        let cursor = list_cursor(req);
        let (tools, next_cursor) = self.registry.list_tools(cursor.as_deref());
        Ok(serde_json::to_value(ListToolsResult { tools, next_cursor }).unwrap())
    }

    async fn handle_tools_call(
        &self,
        req: &Request,
        ctx: &RequestContext,
    ) -> Result<serde_json::Value, ServerError> {
        let params: CallToolParams = parse_params(req)?;
        let (_, handler) = self
            .registry
            .find_tool(&params.name)
            .ok_or_else(|| ServerError(protomcp_core::Error::invalid_params(format!(
                "unknown tool: {}",
                params.name
            ))))?;
        let handler = self.middleware.wrap_tool(handler);
        let result = handler.call(params.arguments, ctx.clone()).await?;
        Ok(serde_json::to_value(result).unwrap())
    }

    fn handle_resources_list(&self, req: &Request) -> Result<serde_json::Value, ServerError> {
        let cursor = list_cursor(req);
        let (resources, next_cursor) = self.registry.list_resources(cursor.as_deref());
        Ok(serde_json::to_value(ListResourcesResult { resources, next_cursor }).unwrap())
    }

    fn handle_resource_templates_list(&self) -> Result<serde_json::Value, ServerError> {
        let resource_templates = self.registry.list_resource_templates();
        Ok(serde_json::to_value(ListResourceTemplatesResult {
            resource_templates,
            next_cursor: None,
        })
        .unwrap())
    }

    async fn handle_resources_read(
        &self,
        req: &Request,
        ctx: &RequestContext,
    ) -> Result<serde_json::Value, ServerError> {
        let params: ReadResourceParams = parse_params(req)?;
        let (handler, bound, _mime) = self
            .registry
            .find_resource(&params.uri)
            .ok_or_else(|| ServerError(protomcp_core::Error::invalid_params(format!(
                "unknown resource: {}",
                params.uri
            ))))?;
        let handler = self.middleware.wrap_resource(handler);
        let contents = handler.read(&params.uri, &bound, ctx.clone()).await?;
        Ok(serde_json::to_value(ReadResourceResult { contents }).unwrap())
    }

    fn handle_subscribe(&self, session: &Arc<Session>, req: &Request) -> Result<serde_json::Value, ServerError> {
        let params: SubscribeParams = parse_params(req)?;
        if !self.registry.contains_resource(&params.uri) {
            return Err(ServerError(protomcp_core::Error::invalid_params(format!(
                "unknown resource: {}",
                params.uri
            ))));
        }
        session.subscribe(params.uri);
        Ok(serde_json::json!({}))
    }

    fn handle_unsubscribe(&self, session: &Arc<Session>, req: &Request) -> Result<serde_json::Value, ServerError> {
        let params: SubscribeParams = parse_params(req)?;
        session.unsubscribe(&params.uri);
        Ok(serde_json::json!({}))
    }

    fn handle_prompts_list(&self, req: &Request) -> Result<serde_json::Value, ServerError> {
        let cursor = list_cursor(req);
        let (prompts, next_cursor) = self.registry.list_prompts(cursor.as_deref());
        Ok(serde_json::to_value(ListPromptsResult { prompts, next_cursor }).unwrap())
    }

    async fn handle_prompts_get(
        &self,
        req: &Request,
        ctx: &RequestContext,
    ) -> Result<serde_json::Value, ServerError> {
        let params: GetPromptParams = parse_params(req)?;
        let (_, handler) = self
            .registry
            .find_prompt(&params.name)
            .ok_or_else(|| ServerError(protomcp_core::Error::invalid_params(format!(
                "unknown prompt: {}",
                params.name
            ))))?;
        let handler = self.middleware.wrap_prompt(handler);
        let result = handler.get(params.arguments, ctx.clone()).await?;
        Ok(serde_json::to_value(result).unwrap())
    }

    /// Emit `notifications/tools|resources|prompts/list_changed` to every
    /// active session (§4.5). The wire schema has no per-client opt-in for
    /// this notification family, so every connected session is notified;
    /// see DESIGN.md for the reasoning.
    pub async fn notify_list_changed(&self, family: Family) {
        let method = match family {
            Family::Tool => method::NOTIFICATIONS_TOOLS_LIST_CHANGED,
            Family::Resource => method::NOTIFICATIONS_RESOURCES_LIST_CHANGED,
            Family::Prompt => method::NOTIFICATIONS_PROMPTS_LIST_CHANGED,
            Family::Other => return,
        };
        for session in self.sessions.all() {
            session.notify(Notification::new(method, None)).await;
        }
    }

    /// Emit `notifications/resources/updated` to sessions subscribed to
    /// `uri` (§4.5).
    pub async fn notify_resource_updated(&self, uri: &str) {
        let params = serde_json::to_value(ResourceUpdatedParams { uri: uri.to_string() }).ok();
        for session in self.sessions.all() {
            if session.is_subscribed(uri) {
                session
                    .notify(Notification::new(method::NOTIFICATIONS_RESOURCES_UPDATED, params.clone()))
                    .await;
            }
        }
    }
}

fn family_for(method: &str) -> Family {
    if method.starts_with("tools/") {
        Family::Tool
    } else if method.starts_with("resources/") {
        Family::Resource
    } else if method.starts_with("prompts/") {
        Family::Prompt
    } else {
        Family::Other
    }
}

fn list_cursor(req: &Request) -> Option<String> {
    req.params
        .as_ref()
        .and_then(|v| v.get("cursor"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
}

fn parse_params<T: serde::de::DeserializeOwned>(req: &Request) -> Result<T, ServerError> {
    let value = req
        .params
        .clone()
        .ok_or_else(|| ServerError(protomcp_core::Error::invalid_params("missing params")))?;
    serde_json::from_value(value)
        .map_err(|e| ServerError(protomcp_core::Error::invalid_params(e.to_string())))
}

impl From<ServerError> for protomcp_core::Error {
    fn from(e: ServerError) -> Self {
        e.0
    }
}
