//! Application-wide signals

use super::{Event, KeyDown};

/// The set of signals every component talks through
///
/// Constructed first and cleared last by [`crate::Context`].
pub struct EventBus {
    /// Re-read every live field from the config store
    pub reload_fields: Event<()>,

    /// Config was reloaded (profile switch, reset, post-save reload)
    pub reload_config: Event<()>,

    /// Active profile changed; carries the new profile name
    pub profile_changed: Event<String>,

    /// Global key-down from the host input hook
    pub key_down: Event<KeyDown>,

    /// Per-frame game update
    pub update: Event<()>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            reload_fields: Event::new("reload_fields"),
            reload_config: Event::new("reload_config"),
            profile_changed: Event::new("profile_changed"),
            key_down: Event::new("key_down"),
            update: Event::new("update"),
        }
    }

    /// Dispatch a key press, returning whether any handler consumed it
    pub fn dispatch_key(&self, vk: unihook_sdk::Vk) -> bool {
        let event = KeyDown::new(vk);
        self.key_down.emit(&event);
        event.is_handled()
    }

    /// Disconnect every handler on every signal
    pub fn clear(&self) {
        self.reload_fields.clear();
        self.reload_config.clear();
        self.profile_changed.clear();
        self.key_down.clear();
        self.update.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
