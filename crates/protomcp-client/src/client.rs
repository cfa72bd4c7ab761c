//! The client engine (§4.4): drives the initialize handshake and exposes
//! typed operations corresponding to MCP methods.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use protomcp_core::{method, types::*, Notification, RequestId};
use protomcp_transport::{StartContext, Transport};
use serde_json::Value;
use tracing::info;

use crate::correlator::{Correlator, NotificationHandler, ServerRequestHandler};
use crate::error::{ClientError, ClientResult};

/// Default per-request timeout applied when a caller doesn't specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs shared by every operation a [`Client`] sends, mirroring the
/// server's `ServerConfig` (§4.4/ambient config).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub default_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// An MCP client bound to a single transport/session.
pub struct Client {
    correlator: Arc<Correlator>,
    initialized: AtomicBool,
    capabilities: ClientCapabilities,
    client_info: Implementation,
    server_info: tokio::sync::Mutex<Option<InitializeResult>>,
    default_timeout: Duration,
}

impl Client {
    /// Build a client over `transport`. Call [`Client::initialize`] before
    /// any other operation; calling anything else first returns
    /// `NotInitialized` without touching the wire (§4.4).
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, client_info: Implementation) -> Self {
        Self::with_capabilities(transport, client_info, ClientCapabilities::default())
    }

    #[must_use]
    pub fn with_capabilities(
        transport: Arc<dyn Transport>,
        client_info: Implementation,
        capabilities: ClientCapabilities,
    ) -> Self {
        Self::with_config(transport, client_info, capabilities, ClientConfig::default())
    }

    #[must_use]
    pub fn with_config(
        transport: Arc<dyn Transport>,
        client_info: Implementation,
        capabilities: ClientCapabilities,
        config: ClientConfig,
    ) -> Self {
        Self {
            correlator: Arc::new(Correlator::new(transport)),
            initialized: AtomicBool::new(false),
            capabilities,
            client_info,
            server_info: tokio::sync::Mutex::new(None),
            default_timeout: config.default_timeout,
        }
    }

    pub async fn set_notification_handler(&self, handler: NotificationHandler) {
        self.correlator.set_notification_handler(handler).await;
    }

    pub async fn set_server_request_handler(&self, handler: ServerRequestHandler) {
        self.correlator.set_server_request_handler(handler).await;
    }

    fn require_initialized(&self) -> ClientResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ClientError::from(protomcp_core::Error::not_initialized()))
        }
    }

    async fn call<P: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> ClientResult<R> {
        let params_value = match params {
            Some(p) => Some(
                serde_json::to_value(p)
                    .map_err(|e| ClientError::from(protomcp_core::Error::invalid_params(e.to_string())))?,
            ),
            None => None,
        };
        let id = self.correlator.next_request_id();
        let req = protomcp_core::Request::new(id, method, params_value);
        let resp = self
            .correlator
            .send_request(req, Some(self.default_timeout))
            .await?;
        match resp.payload {
            protomcp_core::ResponsePayload::Success { result } => serde_json::from_value(result)
                .map_err(|e| ClientError::from(protomcp_core::Error::internal(format!(
                    "malformed result for {method}: {e}"
                )))),
            protomcp_core::ResponsePayload::Error { error } => Err(ClientError::from(
                protomcp_core::Error::new(protomcp_core::ErrorKind::InternalError, error.message),
            )),
        }
    }

    async fn notify<P: serde::Serialize>(&self, method: &str, params: Option<P>) -> ClientResult<()> {
        let params_value = params.map(|p| serde_json::to_value(p).unwrap_or(Value::Null));
        self.correlator
            .send_notification(Notification::new(method, params_value))
            .await
    }

    /// Perform the initialize handshake (§4.4): start the transport, send
    /// `initialize`, then `notifications/initialized`. No other method may
    /// be called before this completes.
    pub async fn initialize(&self) -> ClientResult<InitializeResult> {
        self.correlator.transport_start_and_pump().await?;

        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: self.capabilities.clone(),
            client_info: self.client_info.clone(),
        };
        let result: InitializeResult = self.call(method::INITIALIZE, Some(params)).await?;
        self.notify::<Value>(method::INITIALIZED, None).await?;
        self.initialized.store(true, Ordering::Release);
        *self.server_info.lock().await = Some(result.clone());
        info!(server = %result.server_info.name, version = %result.protocol_version, "initialized");
        Ok(result)
    }

    pub async fn ping(&self) -> ClientResult<()> {
        self.require_initialized()?;
        let _: Value = self.call(method::PING, Option::<Value>::None).await?;
        Ok(())
    }

    pub async fn list_tools(&self) -> ClientResult<ListToolsResult> {
        self.require_initialized()?;
        self.call(method::TOOLS_LIST, Option::<Value>::None).await
    }

    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<std::collections::HashMap<String, Value>>,
    ) -> ClientResult<CallToolResult> {
        self.require_initialized()?;
        self.call(
            method::TOOLS_CALL,
            Some(CallToolParams {
                name: name.into(),
                arguments,
            }),
        )
        .await
    }

    pub async fn list_resources(&self) -> ClientResult<ListResourcesResult> {
        self.require_initialized()?;
        self.call(method::RESOURCES_LIST, Option::<Value>::None).await
    }

    pub async fn list_resource_templates(&self) -> ClientResult<ListResourceTemplatesResult> {
        self.require_initialized()?;
        self.call(method::RESOURCES_TEMPLATES_LIST, Option::<Value>::None)
            .await
    }

    pub async fn read_resource(&self, uri: impl Into<String>) -> ClientResult<ReadResourceResult> {
        self.require_initialized()?;
        self.call(
            method::RESOURCES_READ,
            Some(ReadResourceParams { uri: uri.into() }),
        )
        .await
    }

    pub async fn subscribe(&self, uri: impl Into<String>) -> ClientResult<()> {
        self.require_initialized()?;
        let _: Value = self
            .call(
                method::RESOURCES_SUBSCRIBE,
                Some(SubscribeParams { uri: uri.into() }),
            )
            .await?;
        Ok(())
    }

    pub async fn unsubscribe(&self, uri: impl Into<String>) -> ClientResult<()> {
        self.require_initialized()?;
        let _: Value = self
            .call(
                method::RESOURCES_UNSUBSCRIBE,
                Some(SubscribeParams { uri: uri.into() }),
            )
            .await?;
        Ok(())
    }

    pub async fn list_prompts(&self) -> ClientResult<ListPromptsResult> {
        self.require_initialized()?;
        self.call(method::PROMPTS_LIST, Option::<Value>::None).await
    }

    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Option<std::collections::HashMap<String, String>>,
    ) -> ClientResult<GetPromptResult> {
        self.require_initialized()?;
        self.call(
            method::PROMPTS_GET,
            Some(GetPromptParams {
                name: name.into(),
                arguments,
            }),
        )
        .await
    }

    pub async fn set_logging_level(&self, level: LogLevel) -> ClientResult<()> {
        self.require_initialized()?;
        let _: Value = self
            .call(method::LOGGING_SET_LEVEL, Some(SetLevelParams { level }))
            .await?;
        Ok(())
    }

    pub async fn complete(
        &self,
        reference: Value,
        argument: CompleteArgument,
    ) -> ClientResult<CompleteResult> {
        self.require_initialized()?;
        self.call(
            method::COMPLETION_COMPLETE,
            Some(CompleteParams {
                reference,
                argument,
            }),
        )
        .await
    }

    /// Cancel an in-flight request by id (§5).
    pub async fn cancel(&self, id: RequestId) {
        self.correlator.cancel(id).await;
    }
}
