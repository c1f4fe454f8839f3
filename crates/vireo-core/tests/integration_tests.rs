//! Integration tests for Vireo Core

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use vireo_core::{
    Collaborators, Dispatcher, DomHandle, Error, EventBinder, EventScope, EventSpec, KernelRegistry,
    LoadRequest, MediaElement, MediaElementFactory, MediaEvent, PluginDefinition, PluginMeta,
    PluginOption, PluginRegistry, RenderBox, SilentLoadOptions, UserConfig,
};

// =============================================================================
// Fake collaborators
// =============================================================================

struct FakeMediaElement {
    time: Mutex<f64>,
    paused: AtomicBool,
    muted: AtomicBool,
    attributes: Mutex<HashMap<String, String>>,
    tx: broadcast::Sender<MediaEvent>,
}

impl FakeMediaElement {
    fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(64);
        Arc::new(Self {
            time: Mutex::new(0.0),
            paused: AtomicBool::new(true),
            muted: AtomicBool::new(false),
            attributes: Mutex::new(HashMap::new()),
            tx,
        })
    }

    fn fire(&self, event: MediaEvent) {
        let _ = self.tx.send(event);
    }

    fn set_time(&self, time: f64) {
        *self.time.lock().unwrap() = time;
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }
}

impl MediaElement for FakeMediaElement {
    fn current_time(&self) -> f64 {
        *self.time.lock().unwrap()
    }

    fn set_current_time(&self, time: f64) {
        self.set_time(time);
    }

    fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.lock().unwrap().get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: &str) {
        self.attributes
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    fn events(&self) -> broadcast::Receiver<MediaEvent> {
        self.tx.subscribe()
    }
}

#[derive(Default)]
struct FakeFactory {
    created: Mutex<Vec<Arc<FakeMediaElement>>>,
}

impl FakeFactory {
    fn created(&self, index: usize) -> Arc<FakeMediaElement> {
        self.created.lock().unwrap()[index].clone()
    }

    fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

impl MediaElementFactory for FakeFactory {
    fn create_element(&self) -> Arc<dyn MediaElement> {
        let element = FakeMediaElement::new();
        let mut created = self.created.lock().unwrap();
        element.set_attribute("data-id", &created.len().to_string());
        created.push(element.clone());
        element
    }
}

#[derive(Default)]
struct FakeDom {
    mounted: Mutex<Option<Arc<dyn MediaElement>>>,
    z_orders: Mutex<Vec<Vec<String>>>,
    teardown: Arc<Mutex<Vec<&'static str>>>,
}

impl FakeDom {
    fn mounted_id(&self) -> Option<String> {
        self.mounted
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|element| element.attribute("data-id"))
    }
}

impl DomHandle for FakeDom {
    fn mount_element(&self, element: Arc<dyn MediaElement>) {
        *self.mounted.lock().unwrap() = Some(element);
    }

    fn unmount_element(&self) {
        *self.mounted.lock().unwrap() = None;
    }

    fn migrate_guarded_attributes(
        &self,
        from: &Arc<dyn MediaElement>,
        to: &Arc<dyn MediaElement>,
    ) {
        for name in vireo_core::media::GUARDED_ATTRIBUTES {
            if let Some(value) = from.attribute(name) {
                to.set_attribute(name, &value);
            }
        }
    }

    fn apply_z_order(&self, order: &[String]) {
        self.z_orders.lock().unwrap().push(order.to_vec());
    }

    fn destroy(&self) {
        self.teardown.lock().unwrap().push("dom");
    }
}

#[derive(Default)]
struct FakeBinder {
    emitted: Mutex<Vec<(EventSpec, serde_json::Value)>>,
    bound: AtomicUsize,
    migrated: AtomicUsize,
    teardown: Arc<Mutex<Vec<&'static str>>>,
}

impl EventBinder for FakeBinder {
    fn subscribe(&self, _spec: EventSpec) {}

    fn emit(&self, spec: EventSpec, payload: serde_json::Value) {
        self.emitted.lock().unwrap().push((spec, payload));
    }

    fn migrate_kernel_events(
        &self,
        _old: &dyn vireo_core::VideoKernel,
        _new: &dyn vireo_core::VideoKernel,
    ) {
        self.migrated.fetch_add(1, Ordering::SeqCst);
    }

    fn bind_element_events(&self, _element: &Arc<dyn MediaElement>) {
        self.bound.fetch_add(1, Ordering::SeqCst);
    }

    fn apply_pending_events(&self, _scope: EventScope) {}

    fn destroy(&self) {
        self.teardown.lock().unwrap().push("binder");
    }
}

struct Player {
    dispatcher: Arc<Dispatcher>,
    dom: Arc<FakeDom>,
    binder: Arc<FakeBinder>,
    factory: Arc<FakeFactory>,
    plugins: Arc<PluginRegistry>,
    #[allow(dead_code)]
    kernels: Arc<KernelRegistry>,
    teardown: Arc<Mutex<Vec<&'static str>>>,
}

async fn build_player(config: UserConfig) -> Player {
    build_player_with(config, Arc::new(PluginRegistry::new()), Arc::new(KernelRegistry::new()))
        .await
}

async fn build_player_with(
    config: UserConfig,
    plugins: Arc<PluginRegistry>,
    kernels: Arc<KernelRegistry>,
) -> Player {
    let teardown = Arc::new(Mutex::new(Vec::new()));
    let dom = Arc::new(FakeDom {
        teardown: teardown.clone(),
        ..FakeDom::default()
    });
    let binder = Arc::new(FakeBinder {
        teardown: teardown.clone(),
        ..FakeBinder::default()
    });
    let factory = Arc::new(FakeFactory::default());
    let dispatcher = Dispatcher::new(
        config,
        Collaborators {
            dom: dom.clone(),
            binder: binder.clone(),
            elements: factory.clone(),
        },
        plugins.clone(),
        kernels.clone(),
    )
    .await
    .expect("player construction failed");
    Player {
        dispatcher: Arc::new(dispatcher),
        dom,
        binder,
        factory,
        plugins,
        kernels,
        teardown,
    }
}

fn quiet_config(src: &str) -> UserConfig {
    UserConfig {
        src: src.to_string(),
        autoload: false,
        ..UserConfig::default()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

// =============================================================================
// Plugin manager tests
// =============================================================================

#[tokio::test]
async fn test_use_unknown_plugin_fails_before_instantiation() {
    let player = build_player(quiet_config("a.mp4")).await;

    let result = player.dispatcher.use_plugin("ghost").await;
    assert!(matches!(result, Err(Error::PluginNotInstalled { .. })));
    assert!(!player.dispatcher.has_used("ghost").await);
    assert!(player.dispatcher.plugin_ids().await.is_empty());
}

#[tokio::test]
async fn test_activation_order_and_sentinels() {
    let plugins = Arc::new(PluginRegistry::new());
    plugins
        .install(PluginDefinition::Config(
            PluginMeta::new("control-bar").with_level(5),
        ))
        .unwrap();
    plugins
        .install(PluginDefinition::Config(PluginMeta::new("danmaku").with_level(2)))
        .unwrap();
    plugins
        .install(PluginDefinition::Config(
            PluginMeta::new("side-panel").with_level(1).with_inner(false),
        ))
        .unwrap();
    let player =
        build_player_with(quiet_config("a.mp4"), plugins, Arc::new(KernelRegistry::new())).await;

    player.dispatcher.use_plugin("control-bar").await.unwrap();
    player.dispatcher.use_plugin("danmaku").await.unwrap();
    player.dispatcher.use_plugin("side-panel").await.unwrap();

    assert_eq!(
        player.dispatcher.plugin_ids().await,
        vec!["controlBar", "danmaku", "sidePanel"]
    );
    let map = player.dispatcher.z_index_map().await;
    assert_eq!(map.inner, vec!["video", "danmaku", "controlBar"]);
    assert_eq!(map.outer, vec!["container", "sidePanel"]);
    assert_eq!(player.dispatcher.top_level(true).await, 5);
    assert_eq!(player.dispatcher.top_level(false).await, 1);

    player.dispatcher.unuse_plugin("danmaku").await;
    let map = player.dispatcher.z_index_map().await;
    assert_eq!(map.inner, vec!["video", "controlBar"]);
    assert_eq!(
        player.dispatcher.plugin_ids().await,
        vec!["controlBar", "sidePanel"]
    );

    // unuse of an inactive plugin is a no-op
    player.dispatcher.unuse_plugin("danmaku").await;
    assert_eq!(
        player.dispatcher.plugin_ids().await,
        vec!["controlBar", "sidePanel"]
    );
}

#[tokio::test]
async fn test_use_with_alias_stores_under_alias() {
    let plugins = Arc::new(PluginRegistry::new());
    plugins
        .install(PluginDefinition::Config(PluginMeta::new("control-bar")))
        .unwrap();
    let player =
        build_player_with(quiet_config("a.mp4"), plugins, Arc::new(KernelRegistry::new())).await;

    player
        .dispatcher
        .use_plugin(PluginOption::new("control-bar").with_alias("main-controls"))
        .await
        .unwrap();

    assert!(player.dispatcher.has_used("mainControls").await);
    assert!(!player.dispatcher.has_used("control-bar").await);
}

#[tokio::test]
async fn test_declared_plugins_activate_during_construction() {
    let plugins = Arc::new(PluginRegistry::new());
    plugins
        .install(PluginDefinition::Config(PluginMeta::new("control-bar")))
        .unwrap();
    let mut config = quiet_config("a.mp4");
    config.plugins = vec![PluginOption::new("control-bar")];
    let player =
        build_player_with(config, plugins, Arc::new(KernelRegistry::new())).await;

    assert!(player.dispatcher.is_ready());
    assert!(player.dispatcher.has_used("controlBar").await);
    let ready_fired = player
        .binder
        .emitted
        .lock()
        .unwrap()
        .iter()
        .any(|(spec, _)| spec.name == "ready");
    assert!(ready_fired);
}

// =============================================================================
// Kernel switch tests
// =============================================================================

fn native_kernel_config(src: &str) -> vireo_core::KernelConfig {
    vireo_core::KernelConfig {
        src: src.to_string(),
        is_live: false,
        box_kind: RenderBox::Native,
        kernels: vireo_core::DeclaredKernels::default(),
        preset: vireo_core::PresetMap::default(),
        resolved: vireo_core::ResolvedKernels::default(),
    }
}

#[tokio::test]
async fn test_switch_preserves_observable_config() {
    let player = build_player(UserConfig {
        muted: true,
        volume: 0.5,
        ..quiet_config("a.mp4")
    })
    .await;

    let element = player.factory.create_element();
    let kernel =
        vireo_core::PlayerKernel::new(element, native_kernel_config("b.mp4")).unwrap();
    player.dispatcher.switch_kernel(kernel, true).await.unwrap();

    let state = player.dispatcher.video_state().await;
    assert_eq!(state.src, "b.mp4");
    assert!(state.muted);
    assert_eq!(state.volume, 0.5);
    assert!(!state.autoload);
    assert_eq!(player.dom.mounted_id().as_deref(), Some("1"));
    assert_eq!(player.binder.migrated.load(Ordering::SeqCst), 1);
    assert_eq!(player.binder.bound.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_switch_defers_element_binding_without_notify() {
    let player = build_player(quiet_config("a.mp4")).await;

    let element = player.factory.create_element();
    let kernel =
        vireo_core::PlayerKernel::new(element, native_kernel_config("b.mp4")).unwrap();
    player
        .dispatcher
        .switch_kernel(kernel, false)
        .await
        .unwrap();

    assert_eq!(player.binder.bound.load(Ordering::SeqCst), 0);
    settle().await;
    assert_eq!(player.binder.bound.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Load tests
// =============================================================================

#[tokio::test]
async fn test_load_same_box_reuses_kernel() {
    let player = build_player(quiet_config("a.mp4")).await;

    player
        .dispatcher
        .load(LoadRequest::src("b.mp4"))
        .await
        .unwrap();

    assert_eq!(player.factory.count(), 1);
    let state = player.dispatcher.video_state().await;
    assert_eq!(state.src, "b.mp4");
    assert!(!state.autoload);
    // the native engine loaded the new source into the element
    assert_eq!(
        player.factory.created(0).attribute("src").as_deref(),
        Some("b.mp4")
    );
}

#[tokio::test]
async fn test_load_box_change_switches_kernel() {
    let kernels = Arc::new(KernelRegistry::new());
    kernels.install_kernel(vireo_core::KernelKind::Flv, Arc::new(PassthroughBuilder));
    let mut config = quiet_config("a.mp4");
    config.kernels = Some(vireo_core::DeclaredKernels::List(vec![
        vireo_core::KernelEntry::Name("flv".to_string()),
    ]));
    let player = build_player_with(config, Arc::new(PluginRegistry::new()), kernels).await;

    player
        .dispatcher
        .load(LoadRequest::src("b.flv"))
        .await
        .unwrap();

    assert_eq!(player.factory.count(), 2);
    assert_eq!(player.dom.mounted_id().as_deref(), Some("1"));
    let state = player.dispatcher.video_state().await;
    assert_eq!(state.src, "b.flv");
    assert_eq!(state.box_kind, RenderBox::Flv);
}

/// Engine that drives the element directly, standing in for a real decoder
struct PassthroughKernel {
    element: Arc<dyn MediaElement>,
}

impl vireo_core::VideoKernel for PassthroughKernel {
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

struct PassthroughBuilder;

impl vireo_core::KernelBuilder for PassthroughBuilder {
    fn name(&self) -> &str {
        "flv"
    }
    fn build(
        &self,
        element: Arc<dyn MediaElement>,
        _config: &vireo_core::KernelConfig,
    ) -> Box<dyn vireo_core::VideoKernel> {
        Box::new(PassthroughKernel { element })
    }
}

// =============================================================================
// Silent load tests
// =============================================================================

#[tokio::test]
async fn test_silent_load_immediate_resolves_through_play_gate() {
    let player = build_player(quiet_config("a.mp4")).await;
    let old = player.factory.created(0);
    old.set_time(10.0);
    old.set_paused(false);

    let dispatcher = player.dispatcher.clone();
    let handle = tokio::spawn(async move {
        dispatcher
            .silent_load(
                "b.mp4",
                SilentLoadOptions {
                    immediate: true,
                    ..SilentLoadOptions::default()
                },
            )
            .await
    });

    settle().await;
    let candidate = player.factory.created(1);
    assert!(candidate.is_muted());
    candidate.fire(MediaEvent::CanPlay);
    settle().await;

    // the player is playing, so the switch waits for its play event
    assert_eq!(player.dom.mounted_id().as_deref(), Some("0"));
    old.fire(MediaEvent::Play);

    timeout(Duration::from_secs(5), handle)
        .await
        .expect("silent load timed out")
        .unwrap()
        .unwrap();
    assert_eq!(player.dispatcher.video_state().await.src, "b.mp4");
    assert_eq!(player.dom.mounted_id().as_deref(), Some("1"));
}

#[tokio::test]
async fn test_silent_load_paused_switches_without_play_gate() {
    let player = build_player(quiet_config("a.mp4")).await;
    player.factory.created(0).set_time(10.0);

    let dispatcher = player.dispatcher.clone();
    let handle = tokio::spawn(async move {
        dispatcher
            .silent_load(
                "b.mp4",
                SilentLoadOptions {
                    immediate: true,
                    ..SilentLoadOptions::default()
                },
            )
            .await
    });

    settle().await;
    player.factory.created(1).fire(MediaEvent::CanPlay);

    timeout(Duration::from_secs(5), handle)
        .await
        .expect("silent load timed out")
        .unwrap()
        .unwrap();
    assert_eq!(player.dispatcher.video_state().await.src, "b.mp4");
}

#[tokio::test]
async fn test_silent_load_preset_abort_creates_no_shadow_engine() {
    let player = build_player(quiet_config("a.mp4")).await;
    let abort = Arc::new(AtomicBool::new(true));

    let result = player
        .dispatcher
        .silent_load(
            "b.mp4",
            SilentLoadOptions {
                abort: Some(abort),
                ..SilentLoadOptions::default()
            },
        )
        .await;

    assert!(matches!(result, Err(Error::Aborted)));
    // only the initial element exists, no shadow was built
    assert_eq!(player.factory.count(), 1);
}

#[tokio::test]
async fn test_silent_load_rejects_with_last_attempt_error() {
    let player = build_player(quiet_config("a.mp4")).await;
    player.factory.created(0).set_time(10.0);

    let dispatcher = player.dispatcher.clone();
    let handle = tokio::spawn(async move {
        dispatcher
            .silent_load(
                "b.mp4",
                SilentLoadOptions {
                    repeat_times: 1,
                    ..SilentLoadOptions::default()
                },
            )
            .await
    });

    settle().await;
    player
        .factory
        .created(1)
        .fire(MediaEvent::Error("decode failed on attempt 0".to_string()));
    settle().await;
    player
        .factory
        .created(2)
        .fire(MediaEvent::Error("decode failed on attempt 1".to_string()));

    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("silent load timed out")
        .unwrap();
    match result {
        Err(Error::Media { message }) => assert_eq!(message, "decode failed on attempt 1"),
        other => panic!("expected the final media error, got {other:?}"),
    }
    assert_eq!(player.factory.count(), 3);
}

#[tokio::test]
async fn test_silent_load_retry_moves_the_target_time() {
    let player = build_player(quiet_config("a.mp4")).await;
    let old = player.factory.created(0);
    old.set_time(10.0);

    let dispatcher = player.dispatcher.clone();
    let handle = tokio::spawn(async move {
        dispatcher
            .silent_load(
                "b.mp4",
                SilentLoadOptions {
                    duration: 2.0,
                    repeat_times: 1,
                    increment: 1.0,
                    ..SilentLoadOptions::default()
                },
            )
            .await
    });

    // attempt 0 targets 10 + 2 + 1 * 0 = 12
    settle().await;
    let first = player.factory.created(1);
    first.fire(MediaEvent::LoadedMetadata);
    settle().await;
    assert_eq!(first.current_time(), 12.0);

    // attempt 1 uses a fresh element and targets 10 + 2 + 1 * 1 = 13
    first.fire(MediaEvent::Error("network hiccup".to_string()));
    settle().await;
    let second = player.factory.created(2);
    assert!(!Arc::ptr_eq(&first, &second));
    second.fire(MediaEvent::LoadedMetadata);
    settle().await;
    assert_eq!(second.current_time(), 13.0);

    second.fire(MediaEvent::CanPlay);
    settle().await;
    old.set_time(13.0);
    old.fire(MediaEvent::TimeUpdate);

    timeout(Duration::from_secs(5), handle)
        .await
        .expect("silent load timed out")
        .unwrap()
        .unwrap();
    assert_eq!(player.dispatcher.video_state().await.src, "b.mp4");
}

#[tokio::test]
async fn test_silent_load_falls_through_when_candidate_is_late() {
    let player = build_player(quiet_config("a.mp4")).await;
    let old = player.factory.created(0);
    old.set_time(10.0);

    let dispatcher = player.dispatcher.clone();
    let handle = tokio::spawn(async move {
        dispatcher
            .silent_load(
                "b.mp4",
                SilentLoadOptions {
                    duration: 2.0,
                    ..SilentLoadOptions::default()
                },
            )
            .await
    });

    settle().await;
    // the switch point passes before the candidate ever becomes ready
    old.set_time(12.5);
    old.fire(MediaEvent::TimeUpdate);

    timeout(Duration::from_secs(5), handle)
        .await
        .expect("silent load timed out")
        .unwrap()
        .unwrap();
    // old playback is kept, nothing was handed off
    assert_eq!(player.dom.mounted_id().as_deref(), Some("0"));
    assert_eq!(player.dispatcher.video_state().await.src, "a.mp4");
}

// =============================================================================
// Destroy tests
// =============================================================================

#[tokio::test]
async fn test_destroy_tears_down_in_order() {
    let player = build_player(quiet_config("a.mp4")).await;

    player.dispatcher.destroy().await.unwrap();

    assert_eq!(*player.teardown.lock().unwrap(), vec!["binder", "dom"]);
    let result = player.dispatcher.use_plugin("anything").await;
    assert!(matches!(result, Err(Error::Destroyed)));
    let result = player
        .dispatcher
        .silent_load("b.mp4", SilentLoadOptions::default())
        .await;
    assert!(matches!(result, Err(Error::Destroyed)));
}

#[tokio::test]
async fn test_destroy_unuses_active_plugins() {
    let player = build_player(quiet_config("a.mp4")).await;
    player
        .plugins
        .install(PluginDefinition::Config(PluginMeta::new("control-bar")))
        .unwrap();
    player.dispatcher.use_plugin("control-bar").await.unwrap();

    player.dispatcher.destroy().await.unwrap();

    assert!(player.dispatcher.plugin_ids().await.is_empty());
}
