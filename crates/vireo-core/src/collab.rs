//! Collaborator contracts
//!
//! The DOM layer and the event binder live outside this crate. The
//! dispatcher only depends on the operations below; concrete
//! implementations belong to the embedding player.

use crate::kernel::VideoKernel;
use crate::media::MediaElement;
use std::sync::Arc;

/// Where a subscription or synthetic event is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    Kernel,
    Element,
    Plugin,
}

/// A subscription or emission handed to the event binder
#[derive(Debug, Clone)]
pub struct EventSpec {
    /// Subscriber identity, e.g. a plugin id or `"dispatcher"`
    pub id: String,
    /// Event name
    pub name: String,
    pub scope: EventScope,
}

impl EventSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>, scope: EventScope) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            scope,
        }
    }
}

/// Container and element management
pub trait DomHandle: Send + Sync {
    /// Mount an element into the player container
    fn mount_element(&self, element: Arc<dyn MediaElement>);

    /// Remove the currently mounted element
    fn unmount_element(&self);

    /// Carry guarded attributes from the outgoing to the incoming element
    fn migrate_guarded_attributes(&self, from: &Arc<dyn MediaElement>, to: &Arc<dyn MediaElement>);

    /// Apply one derived stacking sequence
    fn apply_z_order(&self, order: &[String]);

    /// Whether the player is presented outside its own container,
    /// picture-in-picture style
    fn in_alternate_presentation(&self) -> bool {
        false
    }

    fn exit_alternate_presentation(&self) {}

    fn destroy(&self);
}

/// Subscription registry and synthetic event emission
pub trait EventBinder: Send + Sync {
    fn subscribe(&self, spec: EventSpec);

    fn emit(&self, spec: EventSpec, payload: serde_json::Value);

    /// Move every kernel-level subscription from the outgoing engine to the
    /// incoming one
    fn migrate_kernel_events(&self, old: &dyn VideoKernel, new: &dyn VideoKernel);

    /// Attach element-level listeners to a freshly mounted element
    fn bind_element_events(&self, element: &Arc<dyn MediaElement>);

    /// Flush subscriptions queued before the scope existed
    fn apply_pending_events(&self, scope: EventScope);

    fn destroy(&self);
}
