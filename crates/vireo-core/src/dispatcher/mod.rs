//! Dispatcher - the hub of plugins, the user-facing player and the playback
//! kernel
//!
//! One dispatcher exists per player. It owns the single active kernel and
//! the single mounted media element, manages plugin instances and their
//! stacking order, and routes `load` and `silent_load` through the kernel
//! factory and the switch coordinator.

mod silent_load;
mod switch;

use crate::collab::{DomHandle, EventBinder, EventScope, EventSpec};
use crate::config::{VideoConfig, VideoState};
use crate::error::{Error, Result};
use crate::kernel::{
    resolve_kernels, DeclaredKernels, KernelConfig, KernelRegistry, PlayerKernel, PresetMap,
};
use crate::media::MediaElementFactory;
use crate::plugin::{canonicalize, BasePlugin, Plugin, PluginContext, PluginDefinition, PluginRegistry};
use crate::types::{legal_box, LoadRequest, PlayerId, PluginOption, UserConfig};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Sentinel ids occupying level 0 of the two stacking sequences
const INNER_SENTINEL: &str = "video";
const OUTER_SENTINEL: &str = "container";

/// Derived stacking order of plugins around the media element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZIndexMap {
    pub inner: Vec<String>,
    pub outer: Vec<String>,
}

/// Collaborator handles the dispatcher drives
#[derive(Clone)]
pub struct Collaborators {
    pub dom: Arc<dyn DomHandle>,
    pub binder: Arc<dyn EventBinder>,
    pub elements: Arc<dyn MediaElementFactory>,
}

/// Per-player orchestrator
pub struct Dispatcher {
    id: PlayerId,
    dom: Arc<dyn DomHandle>,
    binder: Arc<dyn EventBinder>,
    elements: Arc<dyn MediaElementFactory>,
    plugin_registry: Arc<PluginRegistry>,
    kernel_registry: Arc<KernelRegistry>,
    video_config: RwLock<VideoConfig>,
    /// The single engine/element pair currently mounted
    active: RwLock<Option<PlayerKernel>>,
    plugins: RwLock<HashMap<String, Box<dyn Plugin>>>,
    /// Plugin activation order
    order: RwLock<Vec<String>>,
    z_index_map: RwLock<ZIndexMap>,
    /// Set once the initial-configuration phase is over; gates whether
    /// `use_plugin` runs the inited hook right away
    config_ready: AtomicBool,
    ready: AtomicBool,
    /// Serializes kernel switches; the runtime is really concurrent, so the
    /// run-to-completion guarantee the algorithm assumes must be explicit
    switch_lock: Mutex<()>,
    destroyed: AtomicBool,
}

impl Dispatcher {
    /// Build a player: activate declared plugins, run their init hooks,
    /// create the initial kernel and mount its element, then run the inited
    /// hooks and fire the ready event.
    #[instrument(skip_all, fields(src = %config.src))]
    pub async fn new(
        config: UserConfig,
        collaborators: Collaborators,
        plugin_registry: Arc<PluginRegistry>,
        kernel_registry: Arc<KernelRegistry>,
    ) -> Result<Self> {
        let dispatcher = Self {
            id: PlayerId::new(),
            dom: collaborators.dom,
            binder: collaborators.binder,
            elements: collaborators.elements,
            plugin_registry,
            kernel_registry,
            video_config: RwLock::new(VideoConfig::new(&config)),
            active: RwLock::new(None),
            plugins: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            z_index_map: RwLock::new(ZIndexMap::default()),
            config_ready: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            switch_lock: Mutex::new(()),
            destroyed: AtomicBool::new(false),
        };

        for option in config.plugins {
            dispatcher.use_plugin(option).await?;
        }

        {
            let state = dispatcher.video_config.read().await.snapshot();
            let plugins = dispatcher.plugins.read().await;
            let order = dispatcher.order.read().await;
            for id in order.iter() {
                if let Some(plugin) = plugins.get(id) {
                    plugin.run_init_hook(&state);
                }
            }
        }
        dispatcher.config_ready.store(true, Ordering::SeqCst);

        let kernel_config = {
            let video_config = dispatcher.video_config.read().await;
            let state = video_config.state();
            dispatcher.kernel_config(
                state.src.clone(),
                state.is_live,
                state.box_kind,
                video_config.kernels().clone(),
                video_config.preset().clone(),
            )?
        };
        let element = dispatcher.elements.create_element();
        let kernel = PlayerKernel::new(element.clone(), kernel_config)?;
        dispatcher.dom.mount_element(element);
        *dispatcher.active.write().await = Some(kernel);
        dispatcher.binder.apply_pending_events(EventScope::Kernel);

        {
            let plugins = dispatcher.plugins.read().await;
            let order = dispatcher.order.read().await;
            for id in order.iter() {
                if let Some(plugin) = plugins.get(id) {
                    plugin.run_inited_hook().await?;
                }
            }
        }
        dispatcher.ready.store(true, Ordering::SeqCst);
        dispatcher.on_ready().await;

        info!(player = %dispatcher.id, "player assembled");
        Ok(dispatcher)
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Whether construction has finished, inited hooks included
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Current observable video configuration
    pub async fn video_state(&self) -> VideoState {
        self.video_config.read().await.snapshot()
    }

    /// Watch observable video configuration changes
    pub async fn subscribe_video_state(&self) -> watch::Receiver<VideoState> {
        self.video_config.read().await.subscribe()
    }

    pub async fn z_index_map(&self) -> ZIndexMap {
        self.z_index_map.read().await.clone()
    }

    /// Activate an installed plugin on this player
    #[instrument(skip_all)]
    pub async fn use_plugin(&self, option: impl Into<PluginOption>) -> Result<()> {
        self.ensure_alive()?;
        let option = option.into();
        let key = canonicalize(&option.name);
        let id = canonicalize(option.alias.as_deref().unwrap_or(&option.name));
        let definition = self
            .plugin_registry
            .config_of(&key)
            .ok_or(Error::PluginNotInstalled { id: key })?;

        let instance: Box<dyn Plugin> = match definition {
            PluginDefinition::Factory(factory) => factory.create(PluginContext {
                id: id.clone(),
                options: option.options,
            }),
            PluginDefinition::Config(meta) => Box::new(BasePlugin::new(id.clone(), meta)),
        };

        {
            let mut plugins = self.plugins.write().await;
            if let Some(replaced) = plugins.insert(id.clone(), instance) {
                warn!(plugin = %id, "this plugin is already in use, replacing the instance");
                replaced.destroy();
            }
            let mut order = self.order.write().await;
            if !order.iter().any(|entry| entry == &id) {
                order.push(id.clone());
            }
        }
        self.sort_z_index().await;

        if self.config_ready.load(Ordering::SeqCst) {
            let plugins = self.plugins.read().await;
            if let Some(plugin) = plugins.get(&id) {
                plugin.run_inited_hook().await?;
            }
        }
        debug!(plugin = %id, "plugin activated");
        Ok(())
    }

    /// Deactivate a plugin instance and drop it from the activation order.
    ///
    /// Calling this for a plugin that is not active is a no-op; the
    /// process-wide definition registry is never touched.
    pub async fn unuse_plugin(&self, name: &str) {
        let id = canonicalize(name);
        {
            let mut plugins = self.plugins.write().await;
            let Some(plugin) = plugins.remove(&id) else {
                warn!(plugin = %id, "unuse called for a plugin that is not active");
                return;
            };
            plugin.destroy();
            let mut order = self.order.write().await;
            order.retain(|entry| entry != &id);
        }
        self.sort_z_index().await;
        debug!(plugin = %id, "plugin deactivated");
    }

    pub async fn has_used(&self, name: &str) -> bool {
        self.plugins
            .read()
            .await
            .contains_key(&canonicalize(name))
    }

    /// Activation order of plugin ids
    pub async fn plugin_ids(&self) -> Vec<String> {
        self.order.read().await.clone()
    }

    /// Level of the top-most plugin of one stacking sequence
    pub async fn top_level(&self, inner: bool) -> u32 {
        let map = self.z_index_map.read().await;
        let sequence = if inner { &map.inner } else { &map.outer };
        let plugins = self.plugins.read().await;
        sequence
            .last()
            .and_then(|id| plugins.get(id))
            .map(|plugin| plugin.level())
            .unwrap_or(0)
    }

    /// Load a source, rebuilding the kernel when the request affects it
    #[instrument(skip_all, fields(player = %self.id))]
    pub async fn load(&self, request: LoadRequest) -> Result<()> {
        self.ensure_alive()?;
        let state = self.video_state().await;
        // an empty src keeps the current one
        let src = request
            .src
            .clone()
            .unwrap_or_else(|| state.src.clone());
        let is_live = request.is_live.unwrap_or(state.is_live);
        let box_kind = request
            .box_kind
            .unwrap_or_else(|| legal_box(&src, state.box_kind));
        let (kernels, preset) = {
            let video_config = self.video_config.read().await;
            (
                request
                    .kernels
                    .clone()
                    .unwrap_or_else(|| video_config.kernels().clone()),
                request
                    .preset
                    .clone()
                    .unwrap_or_else(|| video_config.preset().clone()),
            )
        };

        let old_box = {
            let active = self.active.read().await;
            active.as_ref().ok_or(Error::Destroyed)?.box_kind()
        };
        if box_kind != old_box || request.has_kernel_options() {
            let config =
                self.kernel_config(src.clone(), is_live, box_kind, kernels, preset)?;
            let element = self.elements.create_element();
            let kernel = PlayerKernel::new(element, config)?;
            self.switch_kernel(kernel, true).await?;
        }

        let origin_autoload = state.autoload;
        {
            let mut video_config = self.video_config.write().await;
            video_config.update_unwatched(|state| state.autoload = false);
            video_config.update(|state| {
                if !src.is_empty() {
                    state.src = src.clone();
                }
            });
        }
        {
            let current_src = self.video_state().await.src;
            let active = self.active.read().await;
            active
                .as_ref()
                .ok_or(Error::Destroyed)?
                .load(Some(&current_src));
        }
        self.video_config
            .write()
            .await
            .update_unwatched(|state| state.autoload = origin_autoload);
        Ok(())
    }

    /// Tear down binder, DOM and the active engine, in that order
    pub async fn destroy(&self) -> Result<()> {
        self.ensure_alive()?;
        let ids = self.plugin_ids().await;
        for id in ids {
            self.unuse_plugin(&id).await;
        }
        self.binder.destroy();
        self.dom.destroy();
        if let Some(kernel) = self.active.write().await.take() {
            kernel.destroy();
        }
        self.destroyed.store(true, Ordering::SeqCst);
        info!(player = %self.id, "player destroyed");
        Ok(())
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(Error::Destroyed)
        } else {
            Ok(())
        }
    }

    /// Assemble a fully resolved kernel config
    fn kernel_config(
        &self,
        src: String,
        is_live: bool,
        box_kind: crate::types::RenderBox,
        kernels: DeclaredKernels,
        preset: PresetMap,
    ) -> Result<KernelConfig> {
        let resolved = resolve_kernels(&kernels, &preset, &self.kernel_registry)?;
        Ok(KernelConfig {
            src,
            is_live,
            box_kind,
            kernels,
            preset,
            resolved,
        })
    }

    async fn on_ready(&self) {
        self.binder.emit(
            EventSpec::new("dispatcher", "ready", EventScope::Plugin),
            serde_json::Value::Null,
        );
        self.autoload_src_at_first().await;
    }

    async fn autoload_src_at_first(&self) {
        let state = self.video_state().await;
        if !state.autoload {
            return;
        }
        if state.src.is_empty() {
            warn!("autoload is set without a src, set autoload to false or provide a src");
            return;
        }
        self.binder.emit(
            EventSpec::new("dispatcher", "load", EventScope::Plugin),
            json!({ "src": state.src }),
        );
    }

    /// Regenerate the stacking order after a plugin activation change.
    ///
    /// Activation order is partitioned into inner and outer buckets, grouped
    /// by level ascending, with the sentinel ids prepended at level 0;
    /// activation order is preserved inside a level.
    async fn sort_z_index(&self) {
        let mut inner: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        let mut outer: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        {
            let plugins = self.plugins.read().await;
            let order = self.order.read().await;
            for id in order.iter() {
                let Some(plugin) = plugins.get(id) else {
                    continue;
                };
                let buckets = if plugin.inner() { &mut inner } else { &mut outer };
                buckets.entry(plugin.level()).or_default().push(id.clone());
            }
        }
        inner
            .entry(0)
            .or_default()
            .insert(0, INNER_SENTINEL.to_string());
        outer
            .entry(0)
            .or_default()
            .insert(0, OUTER_SENTINEL.to_string());

        let flatten = |buckets: BTreeMap<u32, Vec<String>>| -> Vec<String> {
            buckets.into_values().flatten().collect()
        };
        let map = ZIndexMap {
            inner: flatten(inner),
            outer: flatten(outer),
        };
        self.dom.apply_z_order(&map.inner);
        self.dom.apply_z_order(&map.outer);
        *self.z_index_map.write().await = map;
    }

    /// Position of the active engine, `0.0` without one
    pub(crate) async fn active_current_time(&self) -> f64 {
        self.active
            .read()
            .await
            .as_ref()
            .map(|kernel| kernel.current_time())
            .unwrap_or(0.0)
    }
}
