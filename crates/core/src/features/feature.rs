//! Feature trait and the state every feature embeds

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use unihook_sdk::keys::{Vk, VK_NONE};

use super::ui::Ui;
use crate::fields::{ConfigObject, Field, FieldRegistry, FieldValue};
use crate::hotkey::{HotkeyField, HotkeyManager};

/// UI tab / config section a feature belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureSection {
    Player,
    Combat,
    Game,
    Settings,
    Debug,
    /// Engine hooks; never drawn
    Hooks,
}

impl FeatureSection {
    /// Every section in tab order
    pub const ALL: [FeatureSection; 6] = [
        FeatureSection::Player,
        FeatureSection::Combat,
        FeatureSection::Game,
        FeatureSection::Settings,
        FeatureSection::Debug,
        FeatureSection::Hooks,
    ];

    /// Section name, also the JSON key under `features`
    pub fn name(self) -> &'static str {
        match self {
            FeatureSection::Player => "Player",
            FeatureSection::Combat => "Combat",
            FeatureSection::Game => "Game",
            FeatureSection::Settings => "Settings",
            FeatureSection::Debug => "Debug",
            FeatureSection::Hooks => "Hooks",
        }
    }

    pub fn allows_draw(self) -> bool {
        self != FeatureSection::Hooks
    }
}

impl fmt::Display for FeatureSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity, config scope and the standard fields of one feature
pub struct FeatureState {
    name: String,
    description: String,
    section: FeatureSection,
    allow_draw: bool,
    object: ConfigObject,
    enabled: Field<bool>,
    toggle_key: HotkeyField,
    /// Enabled value `on_enable` / `on_disable` last acted on; held for the
    /// whole transition
    applied: ReentrantMutex<Cell<bool>>,
    fields: Arc<FieldRegistry>,
    hotkeys: Arc<HotkeyManager>,
}

impl FeatureState {
    /// Create the state and its `enabled` / `toggle_key` fields under
    /// `<section>.<name>`
    pub fn new(
        fields: &Arc<FieldRegistry>,
        hotkeys: &Arc<HotkeyManager>,
        name: &str,
        description: &str,
        section: FeatureSection,
    ) -> Self {
        Self::with_enabled_default(fields, hotkeys, name, description, section, false)
    }

    /// Like [`new`](Self::new), for features that start enabled on a fresh profile
    pub fn with_enabled_default(
        fields: &Arc<FieldRegistry>,
        hotkeys: &Arc<HotkeyManager>,
        name: &str,
        description: &str,
        section: FeatureSection,
        enabled_default: bool,
    ) -> Self {
        let object = ConfigObject::new(section.name(), name);
        let enabled = Field::new(fields, object.path(), "enabled", enabled_default);
        let toggle_key = HotkeyField::new(fields, hotkeys, object.path(), "toggle_key", VK_NONE);

        Self {
            name: name.to_string(),
            description: description.to_string(),
            section,
            allow_draw: section.allows_draw(),
            object,
            enabled,
            toggle_key,
            applied: ReentrantMutex::new(Cell::new(false)),
            fields: Arc::clone(fields),
            hotkeys: Arc::clone(hotkeys),
        }
    }

    /// Additional field stored in this feature's node
    pub fn field<T: FieldValue>(&self, key: &str, default: T) -> Field<T> {
        Field::new(&self.fields, self.object.path(), key, default)
    }

    /// Additional hotkey stored in this feature's node
    pub fn hotkey(&self, key: &str, default_vk: Vk) -> HotkeyField {
        HotkeyField::new(&self.fields, &self.hotkeys, self.object.path(), key, default_vk)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn section(&self) -> FeatureSection {
        self.section
    }

    pub fn allow_draw(&self) -> bool {
        self.allow_draw
    }

    /// `Section.Name` owner path of every field of this feature
    pub fn path(&self) -> &str {
        self.object.path()
    }

    pub fn object(&self) -> &ConfigObject {
        &self.object
    }

    pub fn enabled(&self) -> &Field<bool> {
        &self.enabled
    }

    pub fn toggle_key(&self) -> &HotkeyField {
        &self.toggle_key
    }

    pub fn registry(&self) -> &Arc<FieldRegistry> {
        &self.fields
    }

    /// Silently re-read every field of this feature from the store
    pub fn reload_fields(&self) {
        for field in self.fields.get_fields(self.object.path()) {
            field.reload();
        }
    }
}

/// A toggleable unit of behaviour
///
/// Only [`state`](Feature::state) is required. Enabling and disabling is
/// driven by the `enabled` field: `on_enable` / `on_disable` run exactly once
/// per actual transition, whether it comes from the UI, a hotkey, a control
/// command or a profile switch.
///
/// # Example
///
/// ```ignore
/// struct Fly {
///     state: FeatureState,
///     speed: Field<f64>,
/// }
///
/// impl Feature for Fly {
///     fn state(&self) -> &FeatureState {
///         &self.state
///     }
///
///     fn update(&self) {
///         player::set_fly_speed(self.speed.get());
///     }
/// }
/// ```
pub trait Feature: Send + Sync + 'static {
    fn state(&self) -> &FeatureState;

    /// One-time setup after the config is loaded
    fn init(&self) {}

    /// Per-frame work while enabled
    fn update(&self) {}

    /// Feature-specific controls
    fn draw(&self, _ui: &mut dyn Ui) {}

    fn on_enable(&self) {
        tracing::info!("{} enabled", self.name());
    }

    fn on_disable(&self) {
        tracing::info!("{} disabled", self.name());
    }

    fn name(&self) -> &str {
        self.state().name()
    }

    fn description(&self) -> &str {
        self.state().description()
    }

    fn section(&self) -> FeatureSection {
        self.state().section()
    }

    fn is_enabled(&self) -> bool {
        self.state().enabled().get()
    }

    /// Returns true if the value changed
    fn set_enabled(&self, enabled: bool) -> bool {
        self.state().enabled().set(enabled)
    }

    fn toggle(&self) -> bool {
        self.set_enabled(!self.is_enabled())
    }

    /// Reset every field of this feature to its default
    fn reset_to_default(&self) {
        for field in self.state().registry().get_fields(self.state().path()) {
            field.reset_to_default();
        }
    }

    /// Load fields, then enable if the stored state says so
    fn setup_config(&self) {
        self.state().reload_fields();
        sync_enabled(self);
    }

    /// Reload fields, following a changed `enabled` value with one transition
    fn reload_config(&self) {
        self.state().reload_fields();
        sync_enabled(self);
    }
}

/// Bring `on_enable` / `on_disable` in line with the current `enabled` value
///
/// The value is read under the transition lock, so change events arriving out
/// of order from racing writers still settle on the latest value.
pub(crate) fn sync_enabled<F: Feature + ?Sized>(feature: &F) {
    let applied = feature.state().applied.lock();
    transition(feature, &applied, feature.is_enabled());
}

/// Run `on_enable` / `on_disable` if `enabled` differs from what the feature
/// last acted on
pub(crate) fn apply_enabled<F: Feature + ?Sized>(feature: &F, enabled: bool) {
    let applied = feature.state().applied.lock();
    transition(feature, &applied, enabled);
}

fn transition<F: Feature + ?Sized>(feature: &F, applied: &Cell<bool>, enabled: bool) {
    if applied.replace(enabled) == enabled {
        return;
    }

    if enabled {
        feature.on_enable();
    } else {
        feature.on_disable();
    }
}
