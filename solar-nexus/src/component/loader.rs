//! Resolving component names to definitions.

use anyhow::bail;
use async_trait::async_trait;
use std::collections::HashMap;

use super::traits::ComponentDefinition;

/// Conventional module path for a component named `name`.
pub fn module_path(name: &str) -> String {
    format!("/components/{name}/{name}.js")
}

/// Fetches component definitions by module path.
#[async_trait]
pub trait ModuleSource: Send + Sync {
    async fn fetch(&self, path: &str) -> anyhow::Result<ComponentDefinition>;
}

/// A fixed table of modules, the in-process equivalent of a bundle manifest.
#[derive(Clone, Default, Debug)]
pub struct StaticModules {
    modules: HashMap<String, ComponentDefinition>,
}

impl StaticModules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `definition` at an explicit module path.
    pub fn with(mut self, path: impl Into<String>, definition: ComponentDefinition) -> Self {
        self.modules.insert(path.into(), definition);
        self
    }

    /// Serve `definition` at the conventional path for `name`.
    pub fn component(self, name: &str, definition: ComponentDefinition) -> Self {
        self.with(module_path(name), definition)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[async_trait]
impl ModuleSource for StaticModules {
    async fn fetch(&self, path: &str) -> anyhow::Result<ComponentDefinition> {
        match self.modules.get(path) {
            Some(definition) => Ok(definition.clone()),
            None => bail!("module not found: {path}"),
        }
    }
}
