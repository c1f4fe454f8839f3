//! Core types for Vireo

use crate::error::Error;
use crate::kernel::{DeclaredKernels, PresetMap};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a player instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback-engine families the player can mount.
///
/// A declared kernel name must parse into one of these; anything else is a
/// fatal validation error, while a parseable name with no installed builder
/// is skipped with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelKind {
    Flv,
    Hls,
    Dash,
    Mp4,
}

impl FromStr for KernelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flv" => Ok(KernelKind::Flv),
            "hls" => Ok(KernelKind::Hls),
            "dash" => Ok(KernelKind::Dash),
            "mp4" => Ok(KernelKind::Mp4),
            _ => Err(Error::UnsupportedKernel { name: s.to_string() }),
        }
    }
}

impl std::fmt::Display for KernelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelKind::Flv => write!(f, "flv"),
            KernelKind::Hls => write!(f, "hls"),
            KernelKind::Dash => write!(f, "dash"),
            KernelKind::Mp4 => write!(f, "mp4"),
        }
    }
}

/// Rendering strategy for the media element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderBox {
    #[default]
    Native,
    Flv,
    Hls,
    Dash,
}

impl RenderBox {
    /// The engine family a non-native box mounts through
    pub fn kernel_kind(&self) -> Option<KernelKind> {
        match self {
            RenderBox::Native => None,
            RenderBox::Flv => Some(KernelKind::Flv),
            RenderBox::Hls => Some(KernelKind::Hls),
            RenderBox::Dash => Some(KernelKind::Dash),
        }
    }
}

impl std::fmt::Display for RenderBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderBox::Native => write!(f, "native"),
            RenderBox::Flv => write!(f, "flv"),
            RenderBox::Hls => write!(f, "hls"),
            RenderBox::Dash => write!(f, "dash"),
        }
    }
}

/// Resolve the effective box for a source.
///
/// An explicitly declared non-native box wins; otherwise the source
/// extension decides.
pub fn legal_box(src: &str, declared: RenderBox) -> RenderBox {
    if declared != RenderBox::Native {
        return declared;
    }
    let path = src
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if path.ends_with(".flv") {
        RenderBox::Flv
    } else if path.ends_with(".m3u8") || path.ends_with(".m3u") {
        RenderBox::Hls
    } else if path.ends_with(".mpd") {
        RenderBox::Dash
    } else {
        RenderBox::Native
    }
}

/// Request to activate a plugin on one player
#[derive(Debug, Clone)]
pub struct PluginOption {
    /// Installed plugin name
    pub name: String,
    /// Optional alias the instance is stored under
    pub alias: Option<String>,
    /// Free-form options handed to the plugin instance
    pub options: serde_json::Value,
}

impl PluginOption {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            options: serde_json::Value::Null,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl From<&str> for PluginOption {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PluginOption {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Top-level player configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub src: String,
    pub is_live: bool,
    pub box_kind: RenderBox,
    pub autoload: bool,
    pub autoplay: bool,
    pub controls: bool,
    pub muted: bool,
    pub volume: f64,
    pub repeat: bool,
    pub preload: String,
    pub poster: String,
    pub playback_rate: f64,
    /// Declared kernels for this player
    #[serde(skip)]
    pub kernels: Option<DeclaredKernels>,
    /// Deprecated preset map, merged below declared kernels
    #[serde(skip)]
    pub preset: PresetMap,
    /// Plugins activated in declared order during construction
    #[serde(skip)]
    pub plugins: Vec<PluginOption>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            src: String::new(),
            is_live: false,
            box_kind: RenderBox::Native,
            autoload: true,
            autoplay: false,
            controls: false,
            muted: false,
            volume: 1.0,
            repeat: false,
            preload: "auto".to_string(),
            poster: String::new(),
            playback_rate: 1.0,
            kernels: None,
            preset: PresetMap::default(),
            plugins: Vec::new(),
        }
    }
}

/// Options for [`Dispatcher::load`](crate::dispatcher::Dispatcher::load)
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    /// New source; `None` or an empty string keeps the current one
    pub src: Option<String>,
    pub is_live: Option<bool>,
    pub box_kind: Option<RenderBox>,
    pub kernels: Option<DeclaredKernels>,
    pub preset: Option<PresetMap>,
}

impl LoadRequest {
    pub fn src(src: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            ..Self::default()
        }
    }

    /// Whether any kernel-affecting option was supplied
    pub fn has_kernel_options(&self) -> bool {
        self.is_live.is_some()
            || self.box_kind.is_some()
            || self.kernels.is_some()
            || self.preset.is_some()
    }
}

/// Options for [`Dispatcher::silent_load`](crate::dispatcher::Dispatcher::silent_load)
#[derive(Debug, Clone)]
pub struct SilentLoadOptions {
    /// Seconds of pre-buffer ahead of the current position before a handoff
    pub duration: f64,
    /// Slack window for time matching
    pub bias: f64,
    /// Extra attempts beyond the first
    pub repeat_times: u32,
    /// Seconds added to the target time per retry
    pub increment: f64,
    /// Live override; live streams always run in immediate mode
    pub is_live: Option<bool>,
    pub box_kind: Option<RenderBox>,
    pub kernels: Option<DeclaredKernels>,
    pub preset: Option<PresetMap>,
    /// Hand off as soon as the candidate is ready, without time matching
    pub immediate: bool,
    /// Cancellation flag sampled at attempt start and at handoff
    pub abort: Option<Arc<AtomicBool>>,
}

impl Default for SilentLoadOptions {
    fn default() -> Self {
        Self {
            duration: 3.0,
            bias: 0.0,
            repeat_times: 0,
            increment: 0.0,
            is_live: None,
            box_kind: None,
            kernels: None,
            preset: None,
            immediate: false,
            abort: None,
        }
    }
}
