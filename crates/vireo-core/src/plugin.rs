//! Plugin definitions, lifecycle capability and the process-wide registry
//!
//! Plugins are installed once per process and used per player. A definition
//! is either declarative (a config carrying a name, level and inner flag,
//! wrapped by [`BasePlugin`] at use time) or constructible (a
//! [`PluginFactory`]). Ids derive from human names by lower-camel
//! canonicalization so `"picture-in-picture"` and `"pictureInPicture"` land
//! on the same registry slot.

use crate::config::VideoState;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Derive a plugin id from a human name: lower-camel canonical form.
///
/// Word boundaries are separators (`-`, `_`, whitespace) and lower-to-upper
/// case transitions, so inputs equal up to case and separator style yield
/// the same id, and the function is idempotent.
pub fn canonicalize(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch == '-' || ch == '_' || ch.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }

    let mut id = String::new();
    for (index, word) in words.iter().enumerate() {
        if index == 0 {
            id.push_str(word);
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                id.extend(first.to_uppercase());
                id.push_str(chars.as_str());
            }
        }
    }
    id
}

/// Lifecycle capability of an active plugin instance
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Effective id the instance is stored under
    fn id(&self) -> &str;

    /// Z-order rank inside its bucket
    fn level(&self) -> u32 {
        0
    }

    /// Rendered inside the media element's box rather than outside it
    fn inner(&self) -> bool {
        true
    }

    /// Runs once while the player assembles its initial configuration
    fn run_init_hook(&self, _config: &VideoState) {}

    /// Runs after the player finished its initial-configuration phase
    async fn run_inited_hook(&self) -> Result<()> {
        Ok(())
    }

    fn destroy(&self) {}
}

/// Declarative plugin definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMeta {
    pub name: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default = "default_inner")]
    pub inner: bool,
    #[serde(default)]
    pub options: Value,
}

fn default_inner() -> bool {
    true
}

impl PluginMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: 0,
            inner: true,
            options: Value::Null,
        }
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_inner(mut self, inner: bool) -> Self {
        self.inner = inner;
        self
    }
}

/// Context handed to a plugin constructor
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Effective id, already canonicalized (alias-aware)
    pub id: String,
    /// Options from the use-time request
    pub options: Value,
}

/// Constructor capability for plugins
pub trait PluginFactory: Send + Sync {
    /// Declared plugin name, canonicalized into the registry id
    fn name(&self) -> &str;

    fn create(&self, context: PluginContext) -> Box<dyn Plugin>;
}

/// An installed plugin definition
#[derive(Clone)]
pub enum PluginDefinition {
    Config(PluginMeta),
    Factory(Arc<dyn PluginFactory>),
}

impl PluginDefinition {
    pub fn declared_name(&self) -> &str {
        match self {
            PluginDefinition::Config(meta) => &meta.name,
            PluginDefinition::Factory(factory) => factory.name(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.declared_name().trim().is_empty() {
            return Err(Error::InvalidPluginName);
        }
        Ok(())
    }
}

impl fmt::Debug for PluginDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginDefinition::Config(meta) => f.debug_tuple("Config").field(meta).finish(),
            PluginDefinition::Factory(factory) => {
                f.debug_tuple("Factory").field(&factory.name()).finish()
            }
        }
    }
}

/// Generic instance wrapped around a declarative definition
pub struct BasePlugin {
    id: String,
    meta: PluginMeta,
}

impl BasePlugin {
    pub fn new(id: impl Into<String>, meta: PluginMeta) -> Self {
        Self {
            id: id.into(),
            meta,
        }
    }

    pub fn meta(&self) -> &PluginMeta {
        &self.meta
    }
}

#[async_trait]
impl Plugin for BasePlugin {
    fn id(&self) -> &str {
        &self.id
    }

    fn level(&self) -> u32 {
        self.meta.level
    }

    fn inner(&self) -> bool {
        self.meta.inner
    }
}

/// Process-wide plugin definition table.
///
/// An explicit service passed around by `Arc`, shared across players and
/// outliving any one of them. Installation is last-write-wins.
#[derive(Default)]
pub struct PluginRegistry {
    definitions: RwLock<HashMap<String, PluginDefinition>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a definition, returning the id it is stored under
    pub fn install(&self, definition: PluginDefinition) -> Result<String> {
        definition.validate()?;
        let id = canonicalize(definition.declared_name());
        let mut definitions = self.definitions.write().unwrap();
        if definitions.contains_key(&id) {
            warn!(plugin = %id, "this plugin is installed again, the older one is replaced");
        }
        definitions.insert(id.clone(), definition);
        Ok(id)
    }

    pub fn uninstall(&self, name: &str) {
        self.definitions
            .write()
            .unwrap()
            .remove(&canonicalize(name));
    }

    pub fn config_of(&self, name: &str) -> Option<PluginDefinition> {
        self.definitions
            .read()
            .unwrap()
            .get(&canonicalize(name))
            .cloned()
    }

    pub fn has_installed(&self, name: &str) -> bool {
        self.definitions
            .read()
            .unwrap()
            .contains_key(&canonicalize(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_equivalence() {
        let expected = "pictureInPicture";
        for input in [
            "picture-in-picture",
            "picture_in_picture",
            "picture in picture",
            "pictureInPicture",
            "PictureInPicture",
            "Picture In Picture",
        ] {
            assert_eq!(canonicalize(input), expected, "input {input:?}");
        }
    }

    #[test]
    fn test_canonicalize_idempotent() {
        for input in ["controlBar", "control-bar", "Control Bar"] {
            let once = canonicalize(input);
            assert_eq!(canonicalize(&once), once);
        }
    }

    #[test]
    fn test_install_rejects_empty_name() {
        let registry = PluginRegistry::new();
        let result = registry.install(PluginDefinition::Config(PluginMeta::new("")));
        assert!(matches!(result, Err(Error::InvalidPluginName)));
    }

    #[test]
    fn test_reinstall_overwrites() {
        let registry = PluginRegistry::new();
        registry
            .install(PluginDefinition::Config(PluginMeta::new("control-bar")))
            .unwrap();
        registry
            .install(PluginDefinition::Config(
                PluginMeta::new("controlBar").with_level(7),
            ))
            .unwrap();

        let Some(PluginDefinition::Config(meta)) = registry.config_of("control bar") else {
            panic!("expected a config definition");
        };
        assert_eq!(meta.level, 7);
    }

    #[test]
    fn test_lookup_canonicalizes() {
        let registry = PluginRegistry::new();
        registry
            .install(PluginDefinition::Config(PluginMeta::new("control-bar")))
            .unwrap();
        assert!(registry.has_installed("controlBar"));
        registry.uninstall("Control Bar");
        assert!(!registry.has_installed("control-bar"));
    }
}
