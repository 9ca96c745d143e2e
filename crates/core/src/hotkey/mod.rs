//! Hotkeys
//!
//! A [`HotkeyField`] persists a virtual-key code like any other field and
//! fires its `triggered` event when the [`HotkeyManager`] sees that key.
//! Clicking a hotkey button puts the manager into capture mode: the next key
//! press becomes the binding, ESC or a mouse button cancels.
//!
//! # Example
//!
//! ```ignore
//! let toggle = HotkeyField::new(&ctx.fields, &ctx.hotkeys, "Player.Fly", "toggle_key", VK_F5);
//! let _sub = toggle.on_triggered(|_| tracing::info!("Fly toggled"));
//!
//! ctx.hotkeys.process_key(VK_F5);
//! ```

mod field;
mod manager;

pub use field::HotkeyField;
pub use manager::{HotkeyKey, HotkeyManager};
