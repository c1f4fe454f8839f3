//! Media element abstraction
//!
//! The orchestration core never touches a real DOM node. It drives elements
//! through this trait and observes them through a broadcast event stream:
//! subscribing is listener registration, dropping the receiver is teardown.

use std::sync::Arc;
use tokio::sync::broadcast;

/// Events a media element emits over its broadcast stream
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Duration and dimensions are known
    LoadedMetadata,
    /// Enough data is buffered to start playback
    CanPlay,
    /// Playback position advanced
    TimeUpdate,
    Play,
    Pause,
    Ended,
    /// Element-level decode or network failure
    Error(String),
}

/// Attributes migrated from the outgoing to the incoming element when the
/// active kernel is switched
pub const GUARDED_ATTRIBUTES: &[&str] = &[
    "autoplay",
    "controls",
    "crossorigin",
    "loop",
    "muted",
    "playsinline",
    "poster",
    "preload",
];

/// One playback surface, mounted or detached
pub trait MediaElement: Send + Sync {
    /// Current playback position in seconds
    fn current_time(&self) -> f64;

    /// Move the playback position
    fn set_current_time(&self, time: f64);

    fn paused(&self) -> bool;

    fn set_muted(&self, muted: bool);

    fn attribute(&self, name: &str) -> Option<String>;

    fn set_attribute(&self, name: &str, value: &str);

    /// Subscribe to this element's event stream
    fn events(&self) -> broadcast::Receiver<MediaEvent>;
}

/// Creates detached media elements: the initial playback surface and the
/// muted shadow candidates used by the silent-load pipeline
pub trait MediaElementFactory: Send + Sync {
    fn create_element(&self) -> Arc<dyn MediaElement>;
}
