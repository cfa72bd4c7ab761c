//! Hooks & middleware (§4.8): ordered callback chains invoked at defined
//! lifecycle points, plus handler-wrapping middleware.
//!
//! Hook chains are append-only and treated as invariant once the server
//! starts serving, so dispatch never takes a lock to read them (§4.8).

use std::sync::Arc;

use crate::context::RequestContext;
use crate::registry::{PromptHandler, ResourceHandler, ToolHandler};
use crate::session::Session;

/// Which capability family a method belongs to, for per-family hooks and
/// middleware (§4.8 expansion).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Tool,
    Resource,
    Prompt,
    Other,
}

type SessionHook = Arc<dyn Fn(&Session) + Send + Sync>;
type DispatchHook = Arc<dyn Fn(&str, &RequestContext) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&str, &protomcp_core::Error) + Send + Sync>;

/// The full set of ordered hook chains a server instance owns.
#[derive(Default)]
pub struct Hooks {
    on_session_register: Vec<SessionHook>,
    on_session_unregister: Vec<SessionHook>,
    before_any: Vec<DispatchHook>,
    after_any: Vec<DispatchHook>,
    before_family: std::collections::HashMap<&'static str, Vec<DispatchHook>>,
    after_family: std::collections::HashMap<&'static str, Vec<DispatchHook>>,
    on_error: Vec<ErrorHook>,
}

fn family_key(family: Family) -> &'static str {
    match family {
        Family::Tool => "tool",
        Family::Resource => "resource",
        Family::Prompt => "prompt",
        Family::Other => "other",
    }
}

impl Hooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_session_register(&mut self, hook: SessionHook) {
        self.on_session_register.push(hook);
    }

    pub fn on_session_unregister(&mut self, hook: SessionHook) {
        self.on_session_unregister.push(hook);
    }

    pub fn before_any(&mut self, hook: DispatchHook) {
        self.before_any.push(hook);
    }

    pub fn after_any(&mut self, hook: DispatchHook) {
        self.after_any.push(hook);
    }

    pub fn before_family(&mut self, family: Family, hook: DispatchHook) {
        self.before_family.entry(family_key(family)).or_default().push(hook);
    }

    pub fn after_family(&mut self, family: Family, hook: DispatchHook) {
        self.after_family.entry(family_key(family)).or_default().push(hook);
    }

    pub fn on_error(&mut self, hook: ErrorHook) {
        self.on_error.push(hook);
    }

    pub(crate) fn fire_session_register(&self, session: &Session) {
        for h in &self.on_session_register {
            h(session);
        }
    }

    pub(crate) fn fire_session_unregister(&self, session: &Session) {
        for h in &self.on_session_unregister {
            h(session);
        }
    }

    pub(crate) fn fire_before(&self, family: Family, method: &str, ctx: &RequestContext) {
        for h in &self.before_any {
            h(method, ctx);
        }
        if let Some(hooks) = self.before_family.get(family_key(family)) {
            for h in hooks {
                h(method, ctx);
            }
        }
    }

    pub(crate) fn fire_after(&self, family: Family, method: &str, ctx: &RequestContext) {
        if let Some(hooks) = self.after_family.get(family_key(family)) {
            for h in hooks {
                h(method, ctx);
            }
        }
        for h in &self.after_any {
            h(method, ctx);
        }
    }

    pub(crate) fn fire_error(&self, method: &str, error: &protomcp_core::Error) {
        for h in &self.on_error {
            h(method, error);
        }
    }
}

/// Per-family middleware stacks. A middleware wraps a handler `Arc` with a
/// same-trait-signature wrapper; stacks compose outermost-first at
/// registration order (the first-registered middleware sees the call
/// first and the result last) (§4.8).
#[derive(Default)]
pub struct MiddlewareStacks {
    tool: Vec<Arc<dyn Fn(Arc<dyn ToolHandler>) -> Arc<dyn ToolHandler> + Send + Sync>>,
    resource: Vec<Arc<dyn Fn(Arc<dyn ResourceHandler>) -> Arc<dyn ResourceHandler> + Send + Sync>>,
    prompt: Vec<Arc<dyn Fn(Arc<dyn PromptHandler>) -> Arc<dyn PromptHandler> + Send + Sync>>,
}

impl MiddlewareStacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tool(&mut self, mw: Arc<dyn Fn(Arc<dyn ToolHandler>) -> Arc<dyn ToolHandler> + Send + Sync>) {
        self.tool.push(mw);
    }

    pub fn add_resource(
        &mut self,
        mw: Arc<dyn Fn(Arc<dyn ResourceHandler>) -> Arc<dyn ResourceHandler> + Send + Sync>,
    ) {
        self.resource.push(mw);
    }

    pub fn add_prompt(&mut self, mw: Arc<dyn Fn(Arc<dyn PromptHandler>) -> Arc<dyn PromptHandler> + Send + Sync>) {
        self.prompt.push(mw);
    }

    pub(crate) fn wrap_tool(&self, mut handler: Arc<dyn ToolHandler>) -> Arc<dyn ToolHandler> {
        for mw in self.tool.iter().rev() {
            handler = mw(handler);
        }
        handler
    }

    pub(crate) fn wrap_resource(&self, mut handler: Arc<dyn ResourceHandler>) -> Arc<dyn ResourceHandler> {
        for mw in self.resource.iter().rev() {
            handler = mw(handler);
        }
        handler
    }

    pub(crate) fn wrap_prompt(&self, mut handler: Arc<dyn PromptHandler>) -> Arc<dyn PromptHandler> {
        for mw in self.prompt.iter().rev() {
            handler = mw(handler);
        }
        handler
    }
}
