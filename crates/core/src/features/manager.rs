//! Feature registration and fault-isolated dispatch

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use unihook_sdk::keys::Vk;

use super::feature::{apply_enabled, sync_enabled, Feature, FeatureSection};
use super::ui::Ui;
use crate::control::{ControlAction, ControlCommand, ControlError};
use crate::events::{panic_message, EventBus, Subscription};
use crate::hotkey::HotkeyManager;

#[derive(Default)]
struct Features {
    ordered: Vec<Arc<dyn Feature>>,
    by_name: HashMap<String, usize>,
    typed: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

/// Owns every feature and drives its lifecycle
///
/// Each dispatch (`init`, `update`, `draw`, `reload_config`) runs features
/// in registration order. A panicking feature is logged and the rest still
/// run.
pub struct FeatureManager {
    features: RwLock<Features>,
    hotkeys: Arc<HotkeyManager>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl FeatureManager {
    /// Create a manager wired to `bus.key_down`, `bus.reload_config` and
    /// `bus.update`
    pub fn new(bus: &EventBus, hotkeys: Arc<HotkeyManager>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let on_key = weak.clone();
            let on_reload = weak.clone();
            let on_update = weak.clone();

            let subscriptions = vec![
                bus.key_down.subscribe(move |key| {
                    if let Some(manager) = on_key.upgrade() {
                        if manager.on_key_down(key.vk) {
                            key.mark_handled();
                        }
                    }
                }),
                bus.reload_config.subscribe(move |_| {
                    if let Some(manager) = on_reload.upgrade() {
                        manager.reload_config();
                    }
                }),
                bus.update.subscribe(move |_| {
                    if let Some(manager) = on_update.upgrade() {
                        manager.update();
                    }
                }),
            ];

            Self {
                features: RwLock::new(Features::default()),
                hotkeys,
                subscriptions: Mutex::new(subscriptions),
            }
        })
    }

    /// Register a feature
    ///
    /// Returns false if a feature with the same name already exists.
    pub fn register<F: Feature>(&self, feature: Arc<F>) -> bool {
        let name = feature.name().to_string();
        let mut features = self.features.write();
        if features.by_name.contains_key(&name) {
            tracing::warn!("Feature '{}' is already registered", name);
            return false;
        }

        let state = feature.state();

        // The payload may be stale when writers race; re-read under the
        // transition lock instead
        let weak = Arc::downgrade(&feature);
        let enabled = state.enabled().on_changed(move |_| {
            if let Some(feature) = weak.upgrade() {
                sync_enabled(&*feature);
            }
        });

        let weak = Arc::downgrade(&feature);
        let toggle = state.toggle_key().on_triggered(move |_| {
            if let Some(feature) = weak.upgrade() {
                feature.toggle();
            }
        });

        let index = features.ordered.len();
        features.ordered.push(feature.clone());
        features.by_name.insert(name.clone(), index);
        features.typed.insert(TypeId::of::<F>(), feature);
        drop(features);

        self.subscriptions.lock().extend([enabled, toggle]);

        tracing::debug!("Registered feature '{}'", name);
        true
    }

    /// Look up a feature by its concrete type
    pub fn get<F: Feature>(&self) -> Option<Arc<F>> {
        let any = self.features.read().typed.get(&TypeId::of::<F>()).cloned()?;
        any.downcast::<F>().ok()
    }

    pub fn feature(&self, name: &str) -> Option<Arc<dyn Feature>> {
        let features = self.features.read();
        let index = *features.by_name.get(name)?;
        features.ordered.get(index).cloned()
    }

    /// Feature names in registration order
    pub fn names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|feature| feature.name().to_string())
            .collect()
    }

    pub fn features_by_section(&self, section: FeatureSection) -> Vec<Arc<dyn Feature>> {
        self.snapshot()
            .into_iter()
            .filter(|feature| feature.section() == section)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.features.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn Feature>> {
        self.features.read().ordered.clone()
    }

    fn dispatch(&self, stage: &str, features: &[Arc<dyn Feature>], mut f: impl FnMut(&dyn Feature)) {
        for feature in features {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(feature.as_ref()))) {
                tracing::error!(
                    "Feature '{}' panicked during {}: {}",
                    feature.name(),
                    stage,
                    panic_message(&*payload)
                );
            }
        }
    }

    /// Load each feature's config, then run its `init`
    pub fn init(&self) {
        let features = self.snapshot();
        tracing::info!("Initializing {} features...", features.len());

        self.dispatch("init", &features, |feature| {
            feature.setup_config();
            feature.init();
            tracing::info!("Feature '{}' initialized successfully", feature.name());
        });
    }

    pub fn reload_config(&self) {
        self.dispatch("reload", &self.snapshot(), |feature| feature.reload_config());
    }

    /// Run `update` on every enabled feature
    pub fn update(&self) {
        self.dispatch("update", &self.snapshot(), |feature| {
            if feature.is_enabled() {
                feature.update();
            }
        });
    }

    /// Draw one tab per section with the standard controls of each feature
    pub fn draw(&self, ui: &mut dyn Ui) {
        let features = self.snapshot();

        for section in FeatureSection::ALL {
            let visible: Vec<Arc<dyn Feature>> = features
                .iter()
                .filter(|feature| feature.section() == section && feature.state().allow_draw())
                .cloned()
                .collect();
            if visible.is_empty() || !ui.begin_tab(section.name()) {
                continue;
            }

            self.dispatch("draw", &visible, |feature| draw_feature(&mut *ui, feature));
            ui.end_tab();
        }
    }

    /// Route a key press to the hotkeys; returns true if it was consumed
    pub fn on_key_down(&self, vk: Vk) -> bool {
        self.hotkeys.process_key(vk)
    }

    /// Returns false if no feature has that name
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.feature(name) {
            Some(feature) => {
                feature.set_enabled(enabled);
                true
            }
            None => {
                tracing::warn!("Unknown feature '{}'", name);
                false
            }
        }
    }

    /// Execute a control command line and return the reply text
    pub fn apply_command(&self, line: &str) -> String {
        match self.execute(line) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Rejected control command '{}': {}", line.trim(), e);
                e.to_string()
            }
        }
    }

    fn execute(&self, line: &str) -> Result<String, ControlError> {
        let ControlCommand::Feature { name, action } = ControlCommand::parse(line)?;
        let feature = self.feature(&name).ok_or(ControlError::UnknownFeature)?;

        let enabled = match action {
            ControlAction::Enable => true,
            ControlAction::Disable => false,
            ControlAction::Toggle => !feature.is_enabled(),
        };
        feature.set_enabled(enabled);

        let state = if enabled { "enabled" } else { "disabled" };
        Ok(format!("OK: {}:{}", name, state))
    }

    /// Run `on_disable` for every enabled feature and drop all subscriptions
    ///
    /// The stored enabled state is left untouched so the next session
    /// starts the same way.
    pub fn shutdown(&self) {
        self.subscriptions.lock().clear();

        let features = self.snapshot();
        self.dispatch("shutdown", &features, |feature| apply_enabled(feature, false));
        tracing::info!("Shut down {} features", features.len());
    }
}

fn draw_feature(ui: &mut dyn Ui, feature: &dyn Feature) {
    let mut enabled = feature.is_enabled();
    if ui.checkbox(feature.name(), &mut enabled) {
        feature.set_enabled(enabled);
    }
    if !feature.description().is_empty() {
        ui.text(feature.description());
    }
    ui.hotkey_button(feature.state().toggle_key());
    feature.draw(ui);
    ui.separator();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::features::{Click, FeatureState};
    use crate::fields::{Field, FieldRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use unihook_sdk::keys::VK_F1;

    struct Env {
        _dir: tempfile::TempDir,
        bus: Arc<EventBus>,
        store: Arc<ConfigStore>,
        fields: Arc<FieldRegistry>,
        hotkeys: Arc<HotkeyManager>,
        manager: Arc<FeatureManager>,
    }

    fn env() -> Env {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(
            ConfigStore::new(dir.path(), bus.clone()).with_debounce(Duration::from_secs(60)),
        );
        let fields = FieldRegistry::new(store.clone(), &bus);
        let hotkeys = HotkeyManager::new(&bus);
        let manager = FeatureManager::new(&bus, hotkeys.clone());
        Env {
            _dir: dir,
            bus,
            store,
            fields,
            hotkeys,
            manager,
        }
    }

    #[derive(Default)]
    struct Counts {
        enabled: AtomicUsize,
        disabled: AtomicUsize,
        updates: AtomicUsize,
        inits: AtomicUsize,
    }

    struct Fly {
        state: FeatureState,
        speed: Field<f64>,
        counts: Counts,
    }

    impl Fly {
        fn new(env: &Env) -> Arc<Self> {
            let state = FeatureState::new(
                &env.fields,
                &env.hotkeys,
                "Fly",
                "Fly around the map",
                FeatureSection::Player,
            );
            let speed = state.field("speed", 2.0);
            Arc::new(Self {
                state,
                speed,
                counts: Counts::default(),
            })
        }

        fn count(&self, which: fn(&Counts) -> &AtomicUsize) -> usize {
            which(&self.counts).load(Ordering::SeqCst)
        }
    }

    impl Feature for Fly {
        fn state(&self) -> &FeatureState {
            &self.state
        }

        fn init(&self) {
            self.counts.inits.fetch_add(1, Ordering::SeqCst);
        }

        fn update(&self) {
            self.counts.updates.fetch_add(1, Ordering::SeqCst);
        }

        fn on_enable(&self) {
            self.counts.enabled.fetch_add(1, Ordering::SeqCst);
        }

        fn on_disable(&self) {
            self.counts.disabled.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Broken {
        state: FeatureState,
    }

    impl Broken {
        fn new(env: &Env, section: FeatureSection) -> Arc<Self> {
            Arc::new(Self {
                state: FeatureState::new(&env.fields, &env.hotkeys, "Broken", "", section),
            })
        }
    }

    impl Feature for Broken {
        fn state(&self) -> &FeatureState {
            &self.state
        }

        fn init(&self) {
            panic!("init failed");
        }

        fn update(&self) {
            panic!("update failed");
        }

        fn draw(&self, _ui: &mut dyn Ui) {
            panic!("draw failed");
        }
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let env = env();
        assert!(env.manager.register(Fly::new(&env)));
        assert!(!env.manager.register(Fly::new(&env)));
        assert_eq!(env.manager.names(), vec!["Fly"]);
        assert!(env.manager.get::<Fly>().is_some());
        assert!(env.manager.get::<Broken>().is_none());
        assert_eq!(env.manager.features_by_section(FeatureSection::Player).len(), 1);
        assert!(env.manager.features_by_section(FeatureSection::Combat).is_empty());
    }

    #[test]
    fn test_concurrent_register_accepts_one() {
        let env = env();
        let accepted = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    if env.manager.register(Fly::new(&env)) {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(env.manager.len(), 1);
    }

    #[test]
    fn test_racing_toggles_leave_hooks_matching_enabled() {
        for _ in 0..50 {
            let env = env();
            let fly = Fly::new(&env);
            env.manager.register(fly.clone());
            env.manager.init();

            std::thread::scope(|scope| {
                for t in 0..4 {
                    let fly = fly.clone();
                    scope.spawn(move || {
                        for i in 0..20 {
                            fly.set_enabled((t + i) % 2 == 0);
                        }
                    });
                }
            });

            // on_enable and on_disable strictly alternate, starting disabled
            let active = fly.count(|c| &c.enabled) - fly.count(|c| &c.disabled);
            assert_eq!(active, usize::from(fly.is_enabled()));
        }
    }

    #[test]
    fn test_enable_disable_fire_only_on_transitions() {
        let env = env();
        let fly = Fly::new(&env);
        env.manager.register(fly.clone());
        env.manager.init();

        assert!(fly.set_enabled(true));
        assert!(!fly.set_enabled(true));
        assert!(fly.set_enabled(false));
        assert!(!fly.set_enabled(false));

        assert_eq!(fly.count(|c| &c.enabled), 1);
        assert_eq!(fly.count(|c| &c.disabled), 1);
    }

    #[test]
    fn test_init_enables_from_stored_state() {
        let env = env();
        env.store.set_feature_value("Player", "Fly", "enabled", &true);
        env.store.set_feature_value("Player", "Fly", "speed", &9.0);

        let fly = Fly::new(&env);
        env.manager.register(fly.clone());
        env.manager.init();

        assert!(fly.is_enabled());
        assert_eq!(fly.speed.get(), 9.0);
        assert_eq!(fly.count(|c| &c.inits), 1);
        assert_eq!(fly.count(|c| &c.enabled), 1);
    }

    #[test]
    fn test_reload_follows_enabled_transition() {
        let env = env();
        let fly = Fly::new(&env);
        env.manager.register(fly.clone());
        env.manager.init();

        env.store.set_feature_value("Player", "Fly", "enabled", &true);
        env.bus.reload_fields.emit(&());
        env.bus.reload_config.emit(&());
        assert!(fly.is_enabled());
        assert_eq!(fly.count(|c| &c.enabled), 1);

        // Same state again is not a transition
        env.bus.reload_fields.emit(&());
        env.bus.reload_config.emit(&());
        assert_eq!(fly.count(|c| &c.enabled), 1);

        env.store.set_feature_value("Player", "Fly", "enabled", &false);
        env.bus.reload_fields.emit(&());
        env.bus.reload_config.emit(&());
        assert_eq!(fly.count(|c| &c.disabled), 1);
    }

    #[test]
    fn test_toggle_hotkey_toggles_enabled() {
        let env = env();
        let fly = Fly::new(&env);
        fly.state().toggle_key().set_key(VK_F1);
        env.manager.register(fly.clone());
        env.manager.init();

        assert!(env.bus.dispatch_key(VK_F1));
        assert!(fly.is_enabled());
        assert!(env.bus.dispatch_key(VK_F1));
        assert!(!fly.is_enabled());
        assert!(!env.bus.dispatch_key(VK_F1 + 1));
    }

    #[test]
    fn test_update_runs_enabled_features_only() {
        let env = env();
        let fly = Fly::new(&env);
        env.manager.register(fly.clone());
        env.manager.init();

        env.bus.update.emit(&());
        assert_eq!(fly.count(|c| &c.updates), 0);

        fly.set_enabled(true);
        env.bus.update.emit(&());
        assert_eq!(fly.count(|c| &c.updates), 1);
    }

    #[test]
    fn test_panicking_feature_is_isolated() {
        let env = env();
        let broken = Broken::new(&env, FeatureSection::Player);
        let fly = Fly::new(&env);
        env.manager.register(broken.clone());
        env.manager.register(fly.clone());

        env.manager.init();
        assert_eq!(fly.count(|c| &c.inits), 1);

        broken.set_enabled(true);
        fly.set_enabled(true);
        env.manager.update();
        assert_eq!(fly.count(|c| &c.updates), 1);
    }

    #[test]
    fn test_apply_command_replies() {
        let env = env();
        let fly = Fly::new(&env);
        env.manager.register(fly.clone());
        env.manager.init();

        assert_eq!(env.manager.apply_command("feature:Fly:enable"), "OK: Fly:enabled");
        assert!(fly.is_enabled());
        assert_eq!(env.manager.apply_command("feature:Fly:toggle\n"), "OK: Fly:disabled");
        assert!(!fly.is_enabled());
        assert_eq!(env.manager.apply_command("feature:Nope:enable"), "ERROR: Unknown feature");
        assert_eq!(env.manager.apply_command("feature:Fly"), "ERROR: Invalid format");
        assert_eq!(env.manager.apply_command("reboot"), "ERROR: Unknown command");

        assert!(env.manager.set_enabled("Fly", true));
        assert!(!env.manager.set_enabled("Nope", true));
    }

    #[test]
    fn test_shutdown_disables_without_persisting() {
        let env = env();
        let fly = Fly::new(&env);
        env.manager.register(fly.clone());
        env.manager.init();
        fly.set_enabled(true);

        env.manager.shutdown();
        assert_eq!(fly.count(|c| &c.disabled), 1);
        assert!(fly.is_enabled());
        assert!(env.store.get_feature_value("Player", "Fly", "enabled", false));

        // Subscriptions are gone
        fly.set_enabled(false);
        assert_eq!(fly.count(|c| &c.disabled), 1);
        assert_eq!(env.bus.update.handler_count(), 0);
    }

    #[test]
    fn test_reset_to_default_resets_every_field() {
        let env = env();
        let fly = Fly::new(&env);
        env.manager.register(fly.clone());

        fly.speed.set(7.0);
        fly.set_enabled(true);
        fly.reset_to_default();

        assert_eq!(fly.speed.get(), 2.0);
        assert!(!fly.is_enabled());
    }

    #[derive(Default)]
    struct RecordingUi {
        log: Vec<String>,
        click: Option<&'static str>,
    }

    impl Ui for RecordingUi {
        fn begin_tab(&mut self, label: &str) -> bool {
            self.log.push(format!("tab {}", label));
            true
        }

        fn end_tab(&mut self) {
            self.log.push("end".to_string());
        }

        fn checkbox(&mut self, label: &str, value: &mut bool) -> bool {
            self.log.push(format!("checkbox {}", label));
            if self.click == Some(label) {
                *value = !*value;
                return true;
            }
            false
        }

        fn text(&mut self, text: &str) {
            self.log.push(format!("text {}", text));
        }

        fn button(&mut self, label: &str) -> Click {
            self.log.push(format!("button {}", label));
            Click::None
        }

        fn separator(&mut self) {
            self.log.push("separator".to_string());
        }
    }

    #[test]
    fn test_draw_layout_skips_hook_features() {
        let env = env();
        let fly = Fly::new(&env);
        env.manager.register(fly.clone());
        env.manager.register(Broken::new(&env, FeatureSection::Hooks));

        let mut ui = RecordingUi {
            click: Some("Fly"),
            ..Default::default()
        };
        env.manager.draw(&mut ui);

        assert_eq!(
            ui.log,
            vec![
                "tab Player",
                "checkbox Fly",
                "text Fly around the map",
                "button Not Set",
                "separator",
                "end",
            ]
        );
        assert!(fly.is_enabled());
    }

    #[test]
    fn test_draw_isolates_panicking_feature() {
        let env = env();
        env.manager.register(Broken::new(&env, FeatureSection::Debug));

        let mut ui = RecordingUi::default();
        env.manager.draw(&mut ui);

        assert_eq!(ui.log.first().map(String::as_str), Some("tab Debug"));
        assert_eq!(ui.log.last().map(String::as_str), Some("end"));
    }
}
