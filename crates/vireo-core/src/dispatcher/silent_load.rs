//! Silent load - gapless source switching
//!
//! Pre-buffers a candidate source on a hidden, muted element while the old
//! element keeps playing, then hands the candidate over through the switch
//! coordinator once it is ready. Each attempt races four signals: the old
//! element's time progress, and the candidate's canplay, loadedmetadata and
//! error events. Attempts run strictly sequentially, so at most one shadow
//! element is alive at a time.

use super::Dispatcher;
use crate::error::{Error, Result};
use crate::kernel::PlayerKernel;
use crate::media::MediaEvent;
use crate::types::SilentLoadOptions;
use std::sync::atomic::Ordering;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, instrument, warn};

/// How one shadow attempt settled
enum AttemptOutcome {
    /// A ready engine/element pair eligible to become the active kernel
    Handoff(PlayerKernel),
    /// The switch point passed before the candidate was ready; old playback
    /// is kept and nothing is handed off
    FallThrough,
    /// The candidate failed; absorbed unless this was the last attempt
    Failed(Error),
}

impl Dispatcher {
    /// Pre-buffer `src` and swap it in without an observable interruption.
    ///
    /// `options.duration` seconds are buffered ahead of the current position
    /// before the handoff; on failure the attempt is retried up to
    /// `options.repeat_times` more times, moving the target time by
    /// `options.increment` each round. Live streams (and
    /// `options.immediate`) skip time matching and hand off as soon as the
    /// candidate can play.
    #[instrument(skip_all, fields(player = %self.id, src = %src))]
    pub async fn silent_load(&self, src: &str, options: SilentLoadOptions) -> Result<()> {
        self.ensure_alive()?;
        let state = self.video_state().await;
        let is_live = options.is_live.unwrap_or(state.is_live);
        let box_kind = options.box_kind.unwrap_or(state.box_kind);
        let (kernels, preset) = {
            let video_config = self.video_config.read().await;
            (
                options
                    .kernels
                    .clone()
                    .unwrap_or_else(|| video_config.kernels().clone()),
                options
                    .preset
                    .clone()
                    .unwrap_or_else(|| video_config.preset().clone()),
            )
        };
        // seeking a live stream is impossible, so live is always immediate
        let immediate = options.immediate || is_live;
        let config = self.kernel_config(src.to_string(), is_live, box_kind, kernels, preset)?;
        let aborted = || {
            options
                .abort
                .as_ref()
                .map(|flag| flag.load(Ordering::SeqCst))
                .unwrap_or(false)
        };

        for index in 0..=options.repeat_times {
            if aborted() {
                return Err(Error::Aborted);
            }
            match self
                .silent_load_attempt(index, &config, &options, immediate, is_live)
                .await
            {
                AttemptOutcome::Handoff(kernel) => {
                    return self.finish_handoff(kernel, &aborted).await;
                }
                AttemptOutcome::FallThrough => {
                    debug!(attempt = index, "switch point passed, old playback kept");
                    return Ok(());
                }
                AttemptOutcome::Failed(error) => {
                    warn!(attempt = index, %error, "silent load attempt failed");
                    if index == options.repeat_times {
                        return Err(error);
                    }
                }
            }
        }

        let timeout = Error::SilentLoadTimeout {
            src: src.to_string(),
        };
        warn!("{timeout}");
        Err(timeout)
    }

    /// Run one shadow attempt.
    ///
    /// The select loop settles exactly once; every exit drops both event
    /// receivers, and every exit that does not hand the engine off destroys
    /// it first.
    async fn silent_load_attempt(
        &self,
        index: u32,
        config: &crate::kernel::KernelConfig,
        options: &SilentLoadOptions,
        immediate: bool,
        is_live: bool,
    ) -> AttemptOutcome {
        let (old_element, old_time) = {
            let active = self.active.read().await;
            let Some(active) = active.as_ref() else {
                return AttemptOutcome::Failed(Error::Destroyed);
            };
            (active.element().clone(), active.current_time())
        };
        let ideal_time = old_time + options.duration + options.increment * f64::from(index);

        let element = self.elements.create_element();
        element.set_muted(true);
        // listeners go on before the engine starts loading
        let mut candidate_events = element.events();
        let mut old_events = old_element.events();
        let kernel = match PlayerKernel::new(element, config.clone()) {
            Ok(kernel) => kernel,
            Err(fatal) => return AttemptOutcome::Failed(fatal),
        };
        kernel.load(None);
        debug!(attempt = index, ideal_time, immediate, "shadow attempt started");

        let bias = options.bias;
        let mut ready = false;
        loop {
            tokio::select! {
                event = candidate_events.recv() => match event {
                    Ok(MediaEvent::LoadedMetadata) => {
                        if !is_live {
                            let target = if immediate {
                                self.active_current_time().await
                            } else {
                                ideal_time
                            };
                            kernel.seek(target);
                        }
                    }
                    Ok(MediaEvent::CanPlay) => {
                        ready = true;
                        if immediate {
                            return AttemptOutcome::Handoff(kernel);
                        }
                    }
                    Ok(MediaEvent::Error(message)) => {
                        error!(attempt = index, %message, "silent load ran into a media error");
                        kernel.destroy();
                        return AttemptOutcome::Failed(Error::media(message));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => {
                        kernel.destroy();
                        return AttemptOutcome::Failed(Error::media(
                            "candidate element event stream closed",
                        ));
                    }
                },
                event = old_events.recv() => match event {
                    Ok(MediaEvent::TimeUpdate) => {
                        let now = self.active_current_time().await;
                        let reached = if bias <= 0.0 {
                            now >= ideal_time
                        } else {
                            ((ideal_time - now).abs() <= bias && ready)
                                || now - ideal_time > bias
                        };
                        if reached {
                            if !ready {
                                kernel.destroy();
                                return AttemptOutcome::FallThrough;
                            }
                            return AttemptOutcome::Handoff(kernel);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => {
                        kernel.destroy();
                        return AttemptOutcome::Failed(Error::media(
                            "active element event stream closed",
                        ));
                    }
                },
            }
        }
    }

    /// Hand a ready candidate over to the switch coordinator.
    ///
    /// A paused player switches right away; a playing one defers the switch
    /// to the active element's next play event, since swapping mid-scrub
    /// would be visible. The caller owns the play() side effect.
    async fn finish_handoff(
        &self,
        kernel: PlayerKernel,
        aborted: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<()> {
        if aborted() {
            kernel.destroy();
            return Err(Error::Aborted);
        }
        let old_element = {
            let active = self.active.read().await;
            match active.as_ref() {
                Some(active) => active.element().clone(),
                None => {
                    kernel.destroy();
                    return Err(Error::Destroyed);
                }
            }
        };
        if old_element.paused() {
            return self.switch_kernel(kernel, false).await;
        }
        let mut events = old_element.events();
        loop {
            match events.recv().await {
                Ok(MediaEvent::Play) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                // stream gone, the element is being torn down; switch anyway
                Err(RecvError::Closed) => break,
            }
        }
        self.switch_kernel(kernel, false).await
    }
}
