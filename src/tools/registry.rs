//! Tool registry.

use super::Tool;
use crate::types::ToolDefinition;
use crate::{Error, ErrorContext, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Name-keyed set of tools. Safe to share across tasks.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails on an empty name or a name that is already taken.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if name.is_empty() {
            return Err(Error::configuration_with_context(
                "tool name is required",
                ErrorContext::new()
                    .with_field_path("name")
                    .with_source("tool_registry"),
            ));
        }
        let mut tools = self.tools.write().unwrap_or_else(|e| e.into_inner());
        if tools.contains_key(&name) {
            return Err(Error::configuration_with_context(
                format!("tool {} already registered", name),
                ErrorContext::new()
                    .with_field_path("name")
                    .with_source("tool_registry"),
            ));
        }
        tracing::debug!(tool = %name, "tool registered");
        tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// All tools, sorted by name.
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<_> = self
            .tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// Declarations to attach to a request, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list()
            .iter()
            .map(|t| t.definition().clone())
            .collect()
    }

    pub fn remove(&self, name: &str) -> bool {
        self.tools
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .is_some()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    pub fn clear(&self) {
        self.tools.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn count(&self) -> usize {
        self.tools.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

static GLOBAL_REGISTRY: once_cell::sync::Lazy<Arc<ToolRegistry>> =
    once_cell::sync::Lazy::new(|| Arc::new(ToolRegistry::new()));

/// Process-wide registry. Clone the `Arc` to hand it to a [`ToolExecutor`](super::ToolExecutor).
pub fn global_registry() -> &'static Arc<ToolRegistry> {
    &GLOBAL_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{tool_fn, ToolOutput};

    fn echo(name: &str) -> Arc<dyn Tool> {
        tool_fn(ToolDefinition::new(name), |_ctx, args| async move {
            Ok(ToolOutput::ok(args.to_string()))
        })
    }

    #[test]
    fn test_register_rejects_duplicates_and_empty_names() {
        let registry = ToolRegistry::new();
        registry.register(echo("lookup")).unwrap();

        let dup = registry.register(echo("lookup")).unwrap_err();
        assert!(matches!(dup, Error::Configuration { .. }));
        assert!(dup.to_string().contains("tool lookup already registered"));

        let empty = registry.register(echo("")).unwrap_err();
        assert!(empty.to_string().contains("tool name is required"));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_lookup_list_remove_clear() {
        let registry = ToolRegistry::new();
        registry.register(echo("weather")).unwrap();
        registry.register(echo("calculator")).unwrap();

        assert!(registry.has("weather"));
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.get("weather").unwrap().name(), "weather");

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["calculator", "weather"]);

        assert!(registry.remove("weather"));
        assert!(!registry.remove("weather"));
        assert_eq!(registry.count(), 1);

        registry.clear();
        assert_eq!(registry.count(), 0);
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_global_registry_is_shared() {
        global_registry()
            .register(echo("global_clock"))
            .unwrap();
        assert!(global_registry().has("global_clock"));
        assert!(global_registry().remove("global_clock"));
    }
}
