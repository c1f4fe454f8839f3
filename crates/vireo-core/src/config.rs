//! Observable video configuration
//!
//! `VideoConfig` is the dispatcher-owned slice of player state that the
//! outside world can watch. Writes notify a `watch` channel unless the
//! change gate is disabled; the kernel switch coordinator disables the gate
//! while it rewrites carried-over fields so observers never see the
//! intermediate values.

use crate::kernel::{DeclaredKernels, PresetMap};
use crate::types::{RenderBox, UserConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// The externally visible video configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoState {
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
}

impl Default for VideoState {
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
        }
    }
}

/// Reactive property container with a change gate
pub struct VideoConfig {
    /// When false, writes do not notify watchers
    pub change_watchable: bool,
    state: VideoState,
    kernels: DeclaredKernels,
    preset: PresetMap,
    tx: watch::Sender<VideoState>,
}

impl VideoConfig {
    pub fn new(config: &UserConfig) -> Self {
        let state = VideoState {
            src: config.src.clone(),
            is_live: config.is_live,
            box_kind: config.box_kind,
            autoload: config.autoload,
            autoplay: config.autoplay,
            controls: config.controls,
            muted: config.muted,
            volume: config.volume,
            repeat: config.repeat,
            preload: config.preload.clone(),
            poster: config.poster.clone(),
            playback_rate: config.playback_rate,
        };
        let (tx, _) = watch::channel(state.clone());
        Self {
            change_watchable: true,
            state,
            kernels: config.kernels.clone().unwrap_or_default(),
            preset: config.preset.clone(),
            tx,
        }
    }

    pub fn state(&self) -> &VideoState {
        &self.state
    }

    pub fn snapshot(&self) -> VideoState {
        self.state.clone()
    }

    /// Watch observable state changes
    pub fn subscribe(&self) -> watch::Receiver<VideoState> {
        self.tx.subscribe()
    }

    /// Apply a mutation, notifying watchers when the gate is open
    pub fn update(&mut self, mutate: impl FnOnce(&mut VideoState)) {
        mutate(&mut self.state);
        if self.change_watchable {
            self.tx.send_replace(self.state.clone());
        }
    }

    /// Apply a mutation without ever notifying watchers
    pub fn update_unwatched(&mut self, mutate: impl FnOnce(&mut VideoState)) {
        let watchable = self.change_watchable;
        self.change_watchable = false;
        self.update(mutate);
        self.change_watchable = watchable;
    }

    /// Restore every carried-over field from a pre-switch snapshot, keeping
    /// the current `src`
    pub fn restore_guarded(&mut self, snapshot: &VideoState) {
        self.update(|state| {
            let src = std::mem::take(&mut state.src);
            *state = snapshot.clone();
            state.src = src;
        });
    }

    pub fn kernels(&self) -> &DeclaredKernels {
        &self.kernels
    }

    pub fn set_kernels(&mut self, kernels: DeclaredKernels) {
        self.kernels = kernels;
    }

    pub fn preset(&self) -> &PresetMap {
        &self.preset
    }

    pub fn set_preset(&mut self, preset: PresetMap) {
        self.preset = preset;
    }
}
