//! Vireo Core - Player Orchestration Library
//!
//! This crate provides the orchestration core of the Vireo player:
//! - Kernel resolution and the playback-engine factory
//! - Process-wide plugin and kernel registries
//! - Per-player plugin lifecycle and z-order derivation
//! - Atomic kernel switching that preserves observable player state
//! - Silent load: gapless source switching over a shadow element
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Vireo Core                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Kernel    │  │    Plugin    │  │    Kernel    │           │
//! │  │   Resolver   │  │   Registry   │  │   Registry   │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │ Dispatcher  │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │    Switch    │  │ Silent-Load │  │   Z-Order    │            │
//! │  │ Coordinator  │  │  Pipeline   │  │  Derivation  │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The DOM layer, the event binder and the concrete playback engines live
//! outside this crate, behind the traits in [`collab`], [`media`] and
//! [`kernel`].

pub mod collab;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod kernel;
pub mod media;
pub mod plugin;
pub mod types;

pub use collab::{DomHandle, EventBinder, EventScope, EventSpec};
pub use config::{VideoConfig, VideoState};
pub use dispatcher::{Collaborators, Dispatcher, ZIndexMap};
pub use error::{Error, Result};
pub use kernel::{
    resolve_kernels, DeclaredKernels, KernelBuilder, KernelConfig, KernelEntry, KernelHandler,
    KernelRegistry, MapKernelEntry, PlayerKernel, PresetMap, ResolvedKernels, SingleKernelConfig,
    VideoKernel,
};
pub use media::{MediaElement, MediaElementFactory, MediaEvent};
pub use plugin::{
    canonicalize, BasePlugin, Plugin, PluginContext, PluginDefinition, PluginFactory, PluginMeta,
    PluginRegistry,
};
pub use types::{
    legal_box, KernelKind, LoadRequest, PlayerId, PluginOption, RenderBox, SilentLoadOptions,
    UserConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the player library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Vireo Core initialized");
}
