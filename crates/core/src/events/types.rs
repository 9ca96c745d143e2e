//! Event payload types

use std::sync::atomic::{AtomicBool, Ordering};

use unihook_sdk::Vk;

/// Payload of the global key-down event
///
/// Handlers mark the key handled to tell the input hook to swallow it.
#[derive(Debug)]
pub struct KeyDown {
    pub vk: Vk,
    handled: AtomicBool,
}

impl KeyDown {
    pub fn new(vk: Vk) -> Self {
        Self {
            vk,
            handled: AtomicBool::new(false),
        }
    }

    pub fn mark_handled(&self) {
        self.handled.store(true, Ordering::Release);
    }

    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::Acquire)
    }
}

/// Payload of a field change event
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange<T> {
    pub old: T,
    pub new: T,
}
