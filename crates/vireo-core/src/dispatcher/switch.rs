//! Kernel switch coordinator
//!
//! Atomically replaces the active engine/element pair. External observers
//! see the old configuration until the switch is done and never see an
//! intermediate state: the change gate is closed while carried-over fields
//! are rewritten, and the whole transition runs under the switch lock.

use super::Dispatcher;
use crate::error::{Error, Result};
use crate::kernel::PlayerKernel;
use tracing::{debug, instrument};

impl Dispatcher {
    /// Install `kernel` (and the element it is bound to) as the active
    /// kernel, preserving every observable config field the new config does
    /// not explicitly carry.
    ///
    /// Element-level event rebinding runs synchronously when
    /// `notify_immediately` is set and on the next scheduling tick
    /// otherwise, so an autoload-driven switch does not flash default
    /// values at listeners.
    #[instrument(skip_all, fields(player = %self.id))]
    pub async fn switch_kernel(&self, kernel: PlayerKernel, notify_immediately: bool) -> Result<()> {
        let _guard = self.switch_lock.lock().await;

        let snapshot = self.video_config.read().await.snapshot();
        let element = kernel.element().clone();
        let config = kernel.config().clone();

        let old = {
            let mut active = self.active.write().await;
            let old = active.take().ok_or(Error::Destroyed)?;

            self.dom
                .migrate_guarded_attributes(old.element(), &element);
            self.dom.unmount_element();
            self.dom.mount_element(element.clone());

            {
                let mut video_config = self.video_config.write().await;
                // resetting fields on the new element would fire watchers for
                // every difference, so the gate stays closed until the
                // carried-over values are back in place
                video_config.update_unwatched(|state| {
                    state.autoload = false;
                    state.src = config.src.clone();
                });
                let watchable = video_config.change_watchable;
                video_config.change_watchable = false;
                video_config.restore_guarded(&snapshot);
                video_config.change_watchable = watchable;
                video_config.update(|state| {
                    state.is_live = config.is_live;
                    state.box_kind = config.box_kind;
                });
                video_config.set_kernels(config.kernels.clone());
                video_config.set_preset(config.preset.clone());
            }

            self.binder
                .migrate_kernel_events(old.engine(), kernel.engine());
            *active = Some(kernel);
            old
        };
        old.destroy();

        if notify_immediately {
            self.binder.bind_element_events(&element);
        } else {
            let binder = self.binder.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                binder.bind_element_events(&element);
            });
        }

        if self.dom.in_alternate_presentation() {
            self.dom.exit_alternate_presentation();
        }
        debug!(src = %config.src, "kernel switched");
        Ok(())
    }
}
