//! Key → hotkey dispatch and capture state

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};
use unihook_sdk::keys::{self, Vk, CAPTURE_CANCEL_KEYS, VK_NONE};

use super::field::HotkeyShared;
use crate::events::{EventBus, Subscription};

new_key_type! {
    /// Handle of one registered hotkey field
    pub struct HotkeyKey;
}

#[derive(Default)]
struct HotkeyState {
    targets: SlotMap<HotkeyKey, Weak<HotkeyShared>>,
    bindings: HashMap<Vk, Vec<HotkeyKey>>,
    capture: Option<HotkeyKey>,
}

impl HotkeyState {
    fn bind(&mut self, key: HotkeyKey, vk: Vk) {
        if vk != VK_NONE {
            self.bindings.entry(vk).or_default().push(key);
        }
    }

    fn unbind(&mut self, key: HotkeyKey, vk: Vk) {
        if let Some(keys) = self.bindings.get_mut(&vk) {
            keys.retain(|k| *k != key);
            if keys.is_empty() {
                self.bindings.remove(&vk);
            }
        }
    }

    fn unbind_everywhere(&mut self, key: HotkeyKey) {
        self.bindings.retain(|_, keys| {
            keys.retain(|k| *k != key);
            !keys.is_empty()
        });
    }
}

/// Routes key presses to bound [`HotkeyField`](super::HotkeyField)s
pub struct HotkeyManager {
    state: Mutex<HotkeyState>,
    _reload: Subscription,
}

impl HotkeyManager {
    /// Create a manager that rebuilds its bindings on `bus.reload_config`
    pub fn new(bus: &EventBus) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let reload = bus.reload_config.subscribe(move |_| {
                if let Some(manager) = weak.upgrade() {
                    manager.rebuild();
                }
            });

            Self {
                state: Mutex::new(HotkeyState::default()),
                _reload: reload,
            }
        })
    }

    /// Display name for a key code
    pub fn key_name(vk: Vk) -> &'static str {
        keys::key_name(vk)
    }

    /// Every bindable key
    pub fn key_list() -> &'static [(&'static str, Vk)] {
        keys::key_list()
    }

    pub(crate) fn register(&self, target: Weak<HotkeyShared>, vk: Vk) -> HotkeyKey {
        let mut state = self.state.lock();
        let key = state.targets.insert(target);
        state.bind(key, vk);
        key
    }

    pub(crate) fn unregister(&self, key: HotkeyKey) {
        let mut state = self.state.lock();
        state.targets.remove(key);
        state.unbind_everywhere(key);
        if state.capture == Some(key) {
            state.capture = None;
        }
    }

    /// Move a field's binding after its key changed
    pub(crate) fn rebind(&self, key: HotkeyKey, old_vk: Vk, new_vk: Vk) {
        let mut state = self.state.lock();
        if !state.targets.contains_key(key) {
            return;
        }
        state.unbind(key, old_vk);
        state.bind(key, new_vk);
    }

    /// Recompute every binding from the fields' current values
    pub fn rebuild(&self) {
        let targets: Vec<(HotkeyKey, Arc<HotkeyShared>)> = {
            let mut state = self.state.lock();
            state.targets.retain(|_, weak| weak.strong_count() > 0);
            state
                .targets
                .iter()
                .filter_map(|(key, weak)| weak.upgrade().map(|t| (key, t)))
                .collect()
        };

        let bindings: Vec<(HotkeyKey, Vk)> = targets
            .iter()
            .map(|(key, target)| (*key, target.vk()))
            .collect();

        {
            let mut state = self.state.lock();
            state.bindings.clear();
            for (key, vk) in bindings {
                state.bind(key, vk);
            }
        }
        tracing::debug!("Rebuilt hotkey bindings for {} fields", targets.len());
    }

    /// Start capturing the next key press for `key`, cancelling any other capture
    pub(crate) fn begin_capture(&self, key: HotkeyKey) {
        let previous = {
            let mut state = self.state.lock();
            let previous = state.capture.replace(key).filter(|prev| *prev != key);
            let target = previous.and_then(|prev| state.targets.get(prev).and_then(Weak::upgrade));
            target
        };

        if let Some(previous) = previous {
            previous.set_capturing(false);
        }
    }

    /// Clear the capture slot if it belongs to `key`
    pub(crate) fn release_capture(&self, key: HotkeyKey) {
        let mut state = self.state.lock();
        if state.capture == Some(key) {
            state.capture = None;
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.state.lock().capture.is_some()
    }

    pub(crate) fn is_capturing_for(&self, key: HotkeyKey) -> bool {
        self.state.lock().capture == Some(key)
    }

    /// Cancel the active capture, if any
    pub fn cancel_capture(&self) {
        let target = {
            let mut state = self.state.lock();
            let capture = state.capture.take();
            let target = capture.and_then(|key| state.targets.get(key).and_then(Weak::upgrade));
            target
        };

        if let Some(target) = target {
            target.set_capturing(false);
            tracing::debug!("Hotkey capture cancelled");
        }
    }

    /// Handle one key press
    ///
    /// While capturing, the key binds the capturing field (ESC and mouse
    /// buttons cancel instead). Otherwise every field bound to `vk` triggers.
    /// Returns true if the key was consumed.
    pub fn process_key(&self, vk: Vk) -> bool {
        let mut state = self.state.lock();

        let capture = state.capture.take();
        if let Some(key) = capture {
            let target = state.targets.get(key).and_then(Weak::upgrade);
            drop(state);

            let Some(target) = target else {
                return false;
            };

            if CAPTURE_CANCEL_KEYS.contains(&vk) {
                target.set_capturing(false);
                tracing::debug!("Hotkey capture cancelled by {}", keys::key_name(vk));
            } else {
                target.finish_capture(vk);
            }
            return true;
        }

        let targets: Vec<Arc<HotkeyShared>> = state
            .bindings
            .get(&vk)
            .into_iter()
            .flatten()
            .filter_map(|key| state.targets.get(*key).and_then(Weak::upgrade))
            .collect();
        drop(state);

        for target in &targets {
            target.trigger();
        }
        !targets.is_empty()
    }

    /// Number of live hotkey fields
    pub fn len(&self) -> usize {
        self.state.lock().targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fields bound to `vk`
    pub fn binding_count(&self, vk: Vk) -> usize {
        self.state.lock().bindings.get(&vk).map_or(0, Vec::len)
    }
}
