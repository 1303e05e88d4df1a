//! Name → tool lookup.

use std::collections::HashMap;

use super::ToolDescriptor;
use crate::{Error, Result};

/// Tools available to one assistant session.
///
/// Built once, then shared read-only (usually behind an `Arc`) by every run
/// of the session.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from descriptors, failing on the first duplicate name.
    pub fn from_tools(tools: impl IntoIterator<Item = ToolDescriptor>) -> Result<Self> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Register a tool. Names are unique within a registry.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        if self.tools.contains_key(descriptor.name()) {
            return Err(Error::DuplicateTool(descriptor.name().to_string()));
        }
        self.tools.insert(descriptor.name().to_string(), descriptor);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<&ToolDescriptor> {
        self.tools
            .get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
