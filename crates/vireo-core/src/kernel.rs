//! Kernel resolution, registry and the playback-engine factory
//!
//! A "kernel" is a pluggable engine that performs the actual decode and
//! network work against one media element. Users declare kernels either as
//! bare names (resolved against the process-wide installed table) or as
//! config entries carrying an inline builder; `resolve_kernels` turns that
//! declaration into a concrete builder map, and `PlayerKernel` binds exactly
//! one engine to one element.

use crate::error::{Error, Result};
use crate::media::MediaElement;
use crate::types::{legal_box, KernelKind, RenderBox};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// A playback engine bound to one media element.
///
/// Engines surface decode and network failures by emitting
/// [`MediaEvent::Error`](crate::media::MediaEvent::Error) on their bound
/// element. Construction performs no I/O; `load` starts it.
pub trait VideoKernel: Send + Sync {
    fn load(&self, src: &str);

    fn seek(&self, time: f64);

    fn current_time(&self) -> f64;

    /// Release every resource the engine holds. Called exactly once.
    fn destroy(&self);
}

/// Constructor capability for a playback engine
pub trait KernelBuilder: Send + Sync {
    /// The constructor's own identity, used when a declared entry carries no
    /// explicit name
    fn name(&self) -> &str;

    fn build(&self, element: Arc<dyn MediaElement>, config: &KernelConfig) -> Box<dyn VideoKernel>;
}

/// Deprecated kernel declaration form, merged below declared kernels
#[derive(Clone, Default)]
pub struct PresetMap(pub BTreeMap<KernelKind, Arc<dyn KernelBuilder>>);

impl PresetMap {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, kind: KernelKind, builder: Arc<dyn KernelBuilder>) {
        self.0.insert(kind, builder);
    }
}

impl fmt::Debug for PresetMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PresetMap")
            .field(&self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Handler of a declared kernel entry
#[derive(Clone)]
pub enum KernelHandler {
    /// Reference to an already installed kernel
    Installed(String),
    /// Inline constructor supplied by the user
    Builder(Arc<dyn KernelBuilder>),
}

impl fmt::Debug for KernelHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelHandler::Installed(name) => f.debug_tuple("Installed").field(name).finish(),
            KernelHandler::Builder(builder) => {
                f.debug_tuple("Builder").field(&builder.name()).finish()
            }
        }
    }
}

/// One declared kernel with its own options
#[derive(Debug, Clone)]
pub struct SingleKernelConfig {
    /// Explicit kernel name; falls back to the builder's identity
    pub name: Option<String>,
    pub handler: KernelHandler,
    /// Retained as this kernel's per-kernel configuration
    pub options: Value,
}

/// Entry of the list declaration form
#[derive(Debug, Clone)]
pub enum KernelEntry {
    Name(String),
    Config(SingleKernelConfig),
}

/// Entry of the map declaration form
#[derive(Clone)]
pub enum MapKernelEntry {
    Name(String),
    Builder(Arc<dyn KernelBuilder>),
    Config(SingleKernelConfig),
}

impl fmt::Debug for MapKernelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKernelEntry::Name(name) => f.debug_tuple("Name").field(name).finish(),
            MapKernelEntry::Builder(builder) => {
                f.debug_tuple("Builder").field(&builder.name()).finish()
            }
            MapKernelEntry::Config(config) => f.debug_tuple("Config").field(config).finish(),
        }
    }
}

/// User-declared kernels, in either declaration form
#[derive(Debug, Clone)]
pub enum DeclaredKernels {
    List(Vec<KernelEntry>),
    Map(BTreeMap<KernelKind, MapKernelEntry>),
}

impl DeclaredKernels {
    pub fn is_empty(&self) -> bool {
        match self {
            DeclaredKernels::List(entries) => entries.is_empty(),
            DeclaredKernels::Map(entries) => entries.is_empty(),
        }
    }
}

impl Default for DeclaredKernels {
    fn default() -> Self {
        DeclaredKernels::List(Vec::new())
    }
}

/// Output of kernel resolution
#[derive(Clone, Default)]
pub struct ResolvedKernels {
    /// Kernel family to constructor
    pub builders: BTreeMap<KernelKind, Arc<dyn KernelBuilder>>,
    /// Per-kernel option bags retained from config entries
    pub options: BTreeMap<KernelKind, Value>,
}

impl fmt::Debug for ResolvedKernels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedKernels")
            .field("builders", &self.builders.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

/// Process-wide installed-kernels table.
///
/// An explicit service passed around by `Arc`, shared across players and
/// outliving any one of them.
#[derive(Default)]
pub struct KernelRegistry {
    builders: RwLock<BTreeMap<KernelKind, Arc<dyn KernelBuilder>>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install_kernel(&self, kind: KernelKind, builder: Arc<dyn KernelBuilder>) {
        let mut builders = self.builders.write().unwrap();
        if builders.contains_key(&kind) {
            warn!(kernel = %kind, "a kernel is already installed on this key, replacing it");
        }
        builders.insert(kind, builder);
    }

    pub fn install_kernels(
        &self,
        batch: impl IntoIterator<Item = (KernelKind, Arc<dyn KernelBuilder>)>,
    ) {
        for (kind, builder) in batch {
            self.install_kernel(kind, builder);
        }
    }

    pub fn has_installed_kernel(&self, kind: KernelKind) -> bool {
        self.builders.read().unwrap().contains_key(&kind)
    }

    /// Debug aid, removes an installed kernel
    pub fn uninstall_kernel(&self, kind: KernelKind) {
        self.builders.write().unwrap().remove(&kind);
    }

    fn get(&self, kind: KernelKind) -> Option<Arc<dyn KernelBuilder>> {
        self.builders.read().unwrap().get(&kind).cloned()
    }
}

/// Resolve a kernel declaration into a concrete builder map.
///
/// Unknown kernel names are fatal; names that parse but have no installed
/// builder are dropped with a warning. Preset entries merge in below the
/// declared kernels: a declared value wins on key collision.
pub fn resolve_kernels(
    declared: &DeclaredKernels,
    preset: &PresetMap,
    registry: &KernelRegistry,
) -> Result<ResolvedKernels> {
    if declared.is_empty() && !preset.is_empty() {
        warn!("preset is deprecated, declare kernels instead");
    }
    let mut resolved = ResolvedKernels::default();

    match declared {
        DeclaredKernels::List(entries) => {
            for entry in entries {
                match entry {
                    KernelEntry::Name(name) => {
                        let kind: KernelKind = name.parse()?;
                        match registry.get(kind) {
                            Some(builder) => {
                                resolved.builders.insert(kind, builder);
                            }
                            None => warn!(kernel = %kind, "no kernel installed on this key, skipping it"),
                        }
                    }
                    KernelEntry::Config(config) => {
                        resolve_single(config, None, registry, &mut resolved)?;
                    }
                }
            }
        }
        DeclaredKernels::Map(entries) => {
            for (&key, entry) in entries {
                match entry {
                    MapKernelEntry::Name(name) => {
                        let handler: KernelKind = name.parse()?;
                        match registry.get(handler) {
                            Some(builder) => {
                                resolved.builders.insert(key, builder);
                            }
                            None => warn!(kernel = %handler, "no kernel installed on this key, skipping it"),
                        }
                    }
                    MapKernelEntry::Builder(builder) => {
                        resolved.builders.insert(key, builder.clone());
                    }
                    MapKernelEntry::Config(config) => {
                        resolve_single(config, Some(key), registry, &mut resolved)?;
                    }
                }
            }
        }
    }

    for (&kind, builder) in &preset.0 {
        resolved.builders.entry(kind).or_insert_with(|| builder.clone());
    }
    Ok(resolved)
}

/// Resolve one config entry under `key`, or under its own resolved name
fn resolve_single(
    config: &SingleKernelConfig,
    key: Option<KernelKind>,
    registry: &KernelRegistry,
    resolved: &mut ResolvedKernels,
) -> Result<()> {
    match &config.handler {
        KernelHandler::Installed(name) => {
            let handler: KernelKind = name.parse()?;
            let slot = key.unwrap_or(handler);
            match registry.get(handler) {
                Some(builder) => {
                    resolved.builders.insert(slot, builder);
                    if !config.options.is_null() {
                        resolved.options.insert(slot, config.options.clone());
                    }
                }
                None => warn!(kernel = %handler, "no kernel installed on this key, skipping it"),
            }
        }
        KernelHandler::Builder(builder) => {
            let slot = match key {
                Some(key) => key,
                None => config
                    .name
                    .as_deref()
                    .unwrap_or_else(|| builder.name())
                    .parse()?,
            };
            resolved.builders.insert(slot, builder.clone());
            if !config.options.is_null() {
                resolved.options.insert(slot, config.options.clone());
            }
        }
    }
    Ok(())
}

/// Fully resolved configuration handed to an engine
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub src: String,
    pub is_live: bool,
    pub box_kind: RenderBox,
    /// The declaration the resolution came from, carried for config
    /// continuity across a kernel switch
    pub kernels: DeclaredKernels,
    pub preset: PresetMap,
    pub resolved: ResolvedKernels,
}

/// Passthrough engine for natively supported sources
struct NativeKernel {
    element: Arc<dyn MediaElement>,
}

impl VideoKernel for NativeKernel {
    fn load(&self, src: &str) {
        self.element.set_attribute("src", src);
    }

    fn seek(&self, time: f64) {
        self.element.set_current_time(time);
    }

    fn current_time(&self) -> f64 {
        self.element.current_time()
    }

    fn destroy(&self) {}
}

/// One playback engine bound to one media element, plus the fully resolved
/// config it was created from
pub struct PlayerKernel {
    element: Arc<dyn MediaElement>,
    config: KernelConfig,
    engine: Box<dyn VideoKernel>,
    box_kind: RenderBox,
}

impl PlayerKernel {
    /// Bind a new engine to `element`.
    ///
    /// The effective box comes from `legal_box`; a native box mounts the
    /// built-in passthrough engine, any other box requires its resolved
    /// builder.
    pub fn new(element: Arc<dyn MediaElement>, mut config: KernelConfig) -> Result<Self> {
        let box_kind = legal_box(&config.src, config.box_kind);
        config.box_kind = box_kind;
        let engine: Box<dyn VideoKernel> = match box_kind.kernel_kind() {
            None => Box::new(NativeKernel {
                element: element.clone(),
            }),
            Some(kind) => {
                let builder = config.resolved.builders.get(&kind).cloned().ok_or(
                    Error::MissingKernelBuilder {
                        box_kind: box_kind.to_string(),
                    },
                )?;
                builder.build(element.clone(), &config)
            }
        };
        Ok(Self {
            element,
            config,
            engine,
            box_kind,
        })
    }

    pub fn element(&self) -> &Arc<dyn MediaElement> {
        &self.element
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn box_kind(&self) -> RenderBox {
        self.box_kind
    }

    pub fn engine(&self) -> &dyn VideoKernel {
        self.engine.as_ref()
    }

    /// Start loading; `None` loads the configured source
    pub fn load(&self, src: Option<&str>) {
        self.engine.load(src.unwrap_or(&self.config.src));
    }

    pub fn seek(&self, time: f64) {
        self.engine.seek(time);
    }

    pub fn current_time(&self) -> f64 {
        self.engine.current_time()
    }

    pub fn destroy(&self) {
        self.engine.destroy();
    }
}
