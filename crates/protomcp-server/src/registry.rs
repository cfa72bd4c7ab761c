//! The capability registry (§4.6): mutable, insertion-ordered collections
//! of tools, resources (concrete + template), and prompts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use protomcp_core::types::{
    CallToolResult, Content, GetPromptResult, Prompt, Resource, ResourceContents,
    ResourceTemplate, Tool,
};
use serde_json::Value;

use crate::error::ServerResult;

/// Context passed to every capability handler; re-exported from
/// [`crate::context`] to avoid a cyclic module reference here.
pub use crate::context::RequestContext;

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(
        &self,
        arguments: Option<HashMap<String, Value>>,
        ctx: RequestContext,
    ) -> ServerResult<CallToolResult>;
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// `params` carries the variables bound from a matched template, empty
    /// for a concrete resource.
    async fn read(
        &self,
        uri: &str,
        params: &HashMap<String, String>,
        ctx: RequestContext,
    ) -> ServerResult<Vec<ResourceContents>>;
}

#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(
        &self,
        arguments: Option<HashMap<String, String>>,
        ctx: RequestContext,
    ) -> ServerResult<GetPromptResult>;
}

/// Blanket impl so a plain async closure can be registered as a tool
/// handler without a bespoke struct.
#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Option<HashMap<String, Value>>, RequestContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ServerResult<CallToolResult>> + Send,
{
    async fn call(
        &self,
        arguments: Option<HashMap<String, Value>>,
        ctx: RequestContext,
    ) -> ServerResult<CallToolResult> {
        self(arguments, ctx).await
    }
}

/// Blanket impl mirroring [`ToolHandler`]'s, so a plain async closure can be
/// registered as a resource handler.
#[async_trait]
impl<F, Fut> ResourceHandler for F
where
    F: Fn(&str, &HashMap<String, String>, RequestContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ServerResult<Vec<ResourceContents>>> + Send,
{
    async fn read(
        &self,
        uri: &str,
        params: &HashMap<String, String>,
        ctx: RequestContext,
    ) -> ServerResult<Vec<ResourceContents>> {
        self(uri, params, ctx).await
    }
}

/// Blanket impl mirroring [`ToolHandler`]'s, so a plain async closure can be
/// registered as a prompt handler.
#[async_trait]
impl<F, Fut> PromptHandler for F
where
    F: Fn(Option<HashMap<String, String>>, RequestContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ServerResult<GetPromptResult>> + Send,
{
    async fn get(
        &self,
        arguments: Option<HashMap<String, String>>,
        ctx: RequestContext,
    ) -> ServerResult<GetPromptResult> {
        self(arguments, ctx).await
    }
}

struct ToolEntry {
    definition: Tool,
    handler: Arc<dyn ToolHandler>,
}

struct PromptEntry {
    definition: Prompt,
    handler: Arc<dyn PromptHandler>,
}

struct ResourceEntry {
    definition: Resource,
    handler: Arc<dyn ResourceHandler>,
}

struct TemplateEntry {
    definition: ResourceTemplate,
    handler: Arc<dyn ResourceHandler>,
}

/// An insertion-ordered, concurrently-mutable name→entry map. Order is
/// tracked separately from the concurrent map so pagination stays stable
/// across adds/removes that land between pages (§4.6).
struct OrderedMap<V> {
    order: RwLock<Vec<String>>,
    entries: DashMap<String, V>,
}

impl<V> OrderedMap<V> {
    fn new() -> Self {
        Self {
            order: RwLock::new(Vec::new()),
            entries: DashMap::new(),
        }
    }

    fn insert(&self, key: String, value: V) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.write().push(key);
        }
    }

    fn remove(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.order.write().retain(|k| k != key);
        }
        removed
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// A point-in-time ordered snapshot of keys, so a paginated listing
    /// never observes a concurrent add/remove mid-page.
    fn snapshot_keys(&self) -> Vec<String> {
        self.order.read().clone()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

const DEFAULT_PAGE_SIZE: usize = 50;

fn paginate(keys: &[String], cursor: Option<&str>) -> (Vec<String>, Option<String>) {
    let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
    let end = (start + DEFAULT_PAGE_SIZE).min(keys.len());
    let page = keys.get(start..end).unwrap_or_default().to_vec();
    let next = if end < keys.len() {
        Some(end.to_string())
    } else {
        None
    };
    (page, next)
}

/// The server-wide tool/resource/prompt registry.
pub struct Registry {
    tools: OrderedMap<ToolEntry>,
    resources: OrderedMap<ResourceEntry>,
    templates: RwLock<Vec<TemplateEntry>>,
    prompts: OrderedMap<PromptEntry>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: OrderedMap::new(),
            resources: OrderedMap::new(),
            templates: RwLock::new(Vec::new()),
            prompts: OrderedMap::new(),
        }
    }

    // ---- tools ----

    pub fn add_tool(&self, definition: Tool, handler: Arc<dyn ToolHandler>) {
        self.tools.insert(definition.name.clone(), ToolEntry { definition, handler });
    }

    pub fn remove_tool(&self, name: &str) -> bool {
        self.tools.remove(name)
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn find_tool(&self, name: &str) -> Option<(Tool, Arc<dyn ToolHandler>)> {
        self.tools
            .entries
            .get(name)
            .map(|e| (e.definition.clone(), e.handler.clone()))
    }

    pub fn list_tools(&self, cursor: Option<&str>) -> (Vec<Tool>, Option<String>) {
        let (keys, next) = paginate(&self.tools.snapshot_keys(), cursor);
        let items = keys
            .iter()
            .filter_map(|k| self.tools.entries.get(k).map(|e| e.definition.clone()))
            .collect();
        (items, next)
    }

    // ---- resources ----

    pub fn add_resource(&self, definition: Resource, handler: Arc<dyn ResourceHandler>) {
        self.resources
            .insert(definition.uri.clone(), ResourceEntry { definition, handler });
    }

    pub fn remove_resource(&self, uri: &str) -> bool {
        self.resources.remove(uri)
    }

    pub fn add_resource_template(&self, definition: ResourceTemplate, handler: Arc<dyn ResourceHandler>) {
        self.templates.write().push(TemplateEntry { definition, handler });
    }

    pub fn remove_resource_template(&self, uri_template: &str) -> bool {
        let mut templates = self.templates.write();
        let before = templates.len();
        templates.retain(|t| t.definition.uri_template != uri_template);
        templates.len() != before
    }

    pub fn list_resources(&self, cursor: Option<&str>) -> (Vec<Resource>, Option<String>) {
        let (keys, next) = paginate(&self.resources.snapshot_keys(), cursor);
        let items = keys
            .iter()
            .filter_map(|k| self.resources.entries.get(k).map(|e| e.definition.clone()))
            .collect();
        (items, next)
    }

    pub fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        self.templates.read().iter().map(|t| t.definition.clone()).collect()
    }

    /// `find` for a URI first checks concrete entries, then scans templates
    /// in insertion order, returning the first whose pattern matches and
    /// the variables it bound (§4.6).
    pub fn find_resource(
        &self,
        uri: &str,
    ) -> Option<(Arc<dyn ResourceHandler>, HashMap<String, String>, Option<String>)> {
        if let Some(e) = self.resources.entries.get(uri) {
            return Some((e.handler.clone(), HashMap::new(), e.definition.mime_type.clone()));
        }
        for t in self.templates.read().iter() {
            if let Some(params) = match_template(&t.definition.uri_template, uri) {
                return Some((t.handler.clone(), params, t.definition.mime_type.clone()));
            }
        }
        None
    }

    pub fn contains_resource(&self, uri: &str) -> bool {
        self.find_resource(uri).is_some()
    }

    // ---- prompts ----

    pub fn add_prompt(&self, definition: Prompt, handler: Arc<dyn PromptHandler>) {
        self.prompts.insert(definition.name.clone(), PromptEntry { definition, handler });
    }

    pub fn remove_prompt(&self, name: &str) -> bool {
        self.prompts.remove(name)
    }

    pub fn find_prompt(&self, name: &str) -> Option<(Prompt, Arc<dyn PromptHandler>)> {
        self.prompts
            .entries
            .get(name)
            .map(|e| (e.definition.clone(), e.handler.clone()))
    }

    pub fn list_prompts(&self, cursor: Option<&str>) -> (Vec<Prompt>, Option<String>) {
        let (keys, next) = paginate(&self.prompts.snapshot_keys(), cursor);
        let items = keys
            .iter()
            .filter_map(|k| self.prompts.entries.get(k).map(|e| e.definition.clone()))
            .collect();
        (items, next)
    }
}

/// Match a `{param}` uri template against a concrete uri, binding each
/// placeholder to the corresponding path segment (RFC 6570 level-1 style,
/// matched left-to-right per segment).
fn match_template(template: &str, uri: &str) -> Option<HashMap<String, String>> {
    let t_parts: Vec<&str> = template.split('/').collect();
    let u_parts: Vec<&str> = uri.split('/').collect();
    if t_parts.len() != u_parts.len() {
        return None;
    }
    let mut params = HashMap::new();
    for (t, u) in t_parts.iter().zip(u_parts.iter()) {
        if let Some(name) = t.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            params.insert(name.to_string(), (*u).to_string());
        } else if t != u {
            return None;
        }
    }
    Some(params)
}

/// Helper turning raw text into a single-content [`CallToolResult`]; used
/// by simple handlers and the `echo` tool in tests/examples.
#[must_use]
pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(text)],
        is_error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_binds_variables() {
        let params = match_template("users://{id}", "users://42").unwrap();
        assert_eq!(params.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn template_rejects_mismatched_literal_segments() {
        assert!(match_template("users://{id}/profile", "users://42/settings").is_none());
    }

    #[test]
    fn add_then_remove_restores_listing() {
        let registry = Registry::new();
        let before_count = registry.tool_count();
        let before_names: Vec<String> =
            registry.list_tools(None).0.iter().map(|t| t.name.clone()).collect();
        registry.add_tool(
            Tool {
                name: "echo".into(),
                description: None,
                input_schema: serde_json::json!({}),
                annotations: None,
            },
            Arc::new(|_args: Option<HashMap<String, Value>>, _ctx: RequestContext| async {
                Ok(text_result("hi"))
            }),
        );
        assert_eq!(registry.tool_count(), 1);
        registry.remove_tool("echo");
        assert_eq!(registry.tool_count(), before_count);
        let after_names: Vec<String> =
            registry.list_tools(None).0.iter().map(|t| t.name.clone()).collect();
        assert_eq!(after_names, before_names);
    }
}
