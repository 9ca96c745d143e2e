//! Application context
//!
//! Owns every long-lived component and fixes their construction and
//! teardown order:
//!
//! ```text
//! new:      bus → hooks → store (load) → fields → hotkeys → features → tasks
//! shutdown: features → final save → hooks → bus
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use unihook_engine::{ModuleResolver, SystemModules};
use unihook_sdk::keys::Vk;

use crate::config::{ConfigResult, ConfigStore};
use crate::events::EventBus;
use crate::features::{Feature, FeatureManager, FeatureSection, FeatureState};
use crate::fields::FieldRegistry;
use crate::hooks::{DetourEngine, HookError, HookRegistry, InlineDetourEngine};
use crate::hotkey::HotkeyManager;
use crate::tasks::TaskQueue;

/// Inputs for [`Context::new`]
pub struct ContextOptions {
    /// Directory holding `config*.json`
    pub config_dir: PathBuf,

    /// Delay between the last field change and the write to disk
    pub save_debounce: Duration,

    pub engine: Arc<dyn DetourEngine>,
    pub modules: Arc<dyn ModuleResolver>,
}

impl ContextOptions {
    /// Options using the inline detour engine and the OS module loader
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            save_debounce: Duration::from_millis(250),
            engine: Arc::new(InlineDetourEngine::new()),
            modules: Arc::new(SystemModules),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.save_debounce = debounce;
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn DetourEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_modules(mut self, modules: Arc<dyn ModuleResolver>) -> Self {
        self.modules = modules;
        self
    }
}

/// Every component of one attached session
pub struct Context {
    pub bus: Arc<EventBus>,
    pub hooks: Arc<HookRegistry>,
    pub store: Arc<ConfigStore>,
    pub fields: Arc<FieldRegistry>,
    pub hotkeys: Arc<HotkeyManager>,
    pub features: Arc<FeatureManager>,
    pub tasks: Arc<TaskQueue>,
    shut_down: AtomicBool,
}

impl Context {
    /// Build every component and load the active profile
    ///
    /// # Errors
    /// Fails only if the detour engine cannot be initialized.
    pub fn new(options: ContextOptions) -> Result<Self, HookError> {
        let bus = Arc::new(EventBus::new());
        let hooks = Arc::new(HookRegistry::new(options.engine, options.modules)?);

        let store = Arc::new(
            ConfigStore::new(options.config_dir, bus.clone()).with_debounce(options.save_debounce),
        );
        if !store.load() {
            tracing::warn!("Config could not be read, running on defaults");
        }
        tracing::info!(
            "Loaded profile '{}' ({:?})",
            store.current_profile(),
            store.last_outcome()
        );

        let fields = FieldRegistry::new(store.clone(), &bus);
        let hotkeys = HotkeyManager::new(&bus);
        let features = FeatureManager::new(&bus, hotkeys.clone());
        let tasks = Arc::new(TaskQueue::new());

        Ok(Self {
            bus,
            hooks,
            store,
            fields,
            hotkeys,
            features,
            tasks,
            shut_down: AtomicBool::new(false),
        })
    }

    /// State for a new feature bound to this context's registries
    pub fn feature_state(
        &self,
        name: &str,
        description: &str,
        section: FeatureSection,
    ) -> FeatureState {
        FeatureState::new(&self.fields, &self.hotkeys, name, description, section)
    }

    pub fn register_feature<F: Feature>(&self, feature: Arc<F>) -> bool {
        self.features.register(feature)
    }

    /// Per-frame entry: run queued tasks, then emit `update`
    pub fn frame(&self) {
        self.tasks.process();
        self.bus.update.emit(&());
    }

    /// Returns true if a hotkey consumed the key
    pub fn key_down(&self, vk: Vk) -> bool {
        self.bus.dispatch_key(vk)
    }

    pub fn set_profile(&self, profile: &str) -> bool {
        self.store.set_profile(profile)
    }

    /// Write the active profile now, dropping any pending debounced save
    pub fn save(&self) -> ConfigResult<()> {
        self.store.cancel_pending_saves();
        self.store.save()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Tear down in reverse construction order; later calls do nothing
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Shutting down...");

        self.features.shutdown();

        self.store.cancel_pending_saves();
        if self.store.is_dirty() {
            if let Err(e) = self.store.save() {
                tracing::error!("Final config save failed: {}", e);
            }
        }

        self.hooks.shutdown();
        self.bus.clear();

        tracing::info!("Shutdown complete");
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shutdown();
    }
}
