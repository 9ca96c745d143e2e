//! Persisted key binding

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use unihook_sdk::keys::{self, Vk, VK_NONE};

use super::manager::{HotkeyKey, HotkeyManager};
use crate::events::{Event, FieldChange, Subscription};
use crate::fields::{Field, FieldRegistry};

pub(crate) struct HotkeyShared {
    field: Field<Vk>,
    triggered: Event<()>,
    capturing: AtomicBool,
    manager: Weak<HotkeyManager>,
    key: OnceLock<HotkeyKey>,
    change: Mutex<Option<Subscription>>,
}

impl HotkeyShared {
    pub(crate) fn vk(&self) -> Vk {
        self.field.get()
    }

    pub(crate) fn set_capturing(&self, capturing: bool) {
        self.capturing.store(capturing, Ordering::Release);
    }

    pub(crate) fn finish_capture(&self, vk: Vk) {
        self.set_capturing(false);
        self.field.set(vk);
        tracing::info!(
            "Hotkey captured: {} for field '{}'",
            keys::key_name(vk),
            self.field.key()
        );
    }

    pub(crate) fn trigger(&self) {
        if self.vk() != VK_NONE {
            self.triggered.emit(&());
        }
    }
}

impl Drop for HotkeyShared {
    fn drop(&mut self) {
        if let (Some(manager), Some(key)) = (self.manager.upgrade(), self.key.get()) {
            manager.unregister(*key);
        }
    }
}

/// A [`Field`] holding a virtual-key code (0 = unset) that fires
/// [`on_triggered`](Self::on_triggered) handlers when its key is pressed
#[derive(Clone)]
pub struct HotkeyField {
    shared: Arc<HotkeyShared>,
}

impl HotkeyField {
    pub fn new(
        fields: &Arc<FieldRegistry>,
        hotkeys: &Arc<HotkeyManager>,
        owner_path: &str,
        key: &str,
        default_vk: Vk,
    ) -> Self {
        let field = Field::new(fields, owner_path, key, default_vk);
        let shared = Arc::new(HotkeyShared {
            field: field.clone(),
            triggered: Event::new("hotkey_triggered"),
            capturing: AtomicBool::new(false),
            manager: Arc::downgrade(hotkeys),
            key: OnceLock::new(),
            change: Mutex::new(None),
        });

        let slot = hotkeys.register(Arc::downgrade(&shared), field.get());
        let _ = shared.key.set(slot);

        let manager = Arc::downgrade(hotkeys);
        let change = field.on_changed(move |change: &FieldChange<Vk>| {
            if let Some(manager) = manager.upgrade() {
                manager.rebind(slot, change.old, change.new);
            }
        });
        *shared.change.lock() = Some(change);

        Self { shared }
    }

    #[must_use = "dropping the Subscription disconnects the handler immediately"]
    pub fn on_triggered<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.shared.triggered.subscribe(handler)
    }

    /// Fire the handlers if a key is bound
    pub fn trigger(&self) {
        self.shared.trigger();
    }

    pub fn key(&self) -> Vk {
        self.shared.vk()
    }

    pub fn set_key(&self, vk: Vk) -> bool {
        self.shared.field.set(vk)
    }

    pub fn clear(&self) -> bool {
        self.set_key(VK_NONE)
    }

    pub fn key_name(&self) -> &'static str {
        keys::key_name(self.key())
    }

    pub fn field(&self) -> &Field<Vk> {
        &self.shared.field
    }

    fn slot(&self) -> Option<(Arc<HotkeyManager>, HotkeyKey)> {
        Some((self.shared.manager.upgrade()?, *self.shared.key.get()?))
    }

    /// Bind the next key press to this field
    pub fn begin_capture(&self) {
        self.shared.set_capturing(true);
        if let Some((manager, key)) = self.slot() {
            manager.begin_capture(key);
        }
        tracing::debug!("Begin hotkey capture for field '{}'", self.shared.field.key());
    }

    pub fn end_capture(&self, vk: Vk) {
        if let Some((manager, key)) = self.slot() {
            manager.release_capture(key);
        }
        self.shared.finish_capture(vk);
    }

    pub fn cancel_capture(&self) {
        self.shared.set_capturing(false);
        if let Some((manager, key)) = self.slot() {
            manager.release_capture(key);
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.capturing.load(Ordering::Acquire)
            && self
                .slot()
                .is_some_and(|(manager, key)| manager.is_capturing_for(key))
    }

    /// Whether a different field currently owns the capture
    pub fn other_is_capturing(&self) -> bool {
        !self.is_capturing()
            && self
                .shared
                .manager
                .upgrade()
                .is_some_and(|manager| manager.is_capturing())
    }

    /// Binding text: the key name, "Not Set", or "Press key..." while capturing
    pub fn label(&self) -> &'static str {
        if self.is_capturing() {
            "Press key..."
        } else if self.key() == VK_NONE {
            "Not Set"
        } else {
            self.key_name()
        }
    }

    /// Label for a capture button; "Waiting..." while another field captures
    pub fn capture_button_label(&self) -> &'static str {
        if self.other_is_capturing() {
            "Waiting..."
        } else {
            self.label()
        }
    }
}
