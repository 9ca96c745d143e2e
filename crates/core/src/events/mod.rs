//! Event system
//!
//! Multi-subscriber signals used by every other component for change
//! notification.
//!
//! # Architecture
//!
//! ```text
//! Event::emit → snapshot handlers under lock → invoke lock-free (panics isolated)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use unihook_core::events::EventBus;
//!
//! let bus = EventBus::new();
//!
//! // Keep the subscription alive for as long as the handler should run
//! let _sub = bus.profile_changed.subscribe(|name| {
//!     tracing::info!("Switched to profile {}", name);
//! });
//!
//! bus.profile_changed.emit(&"aggressive".to_string());
//! ```

mod bus;
mod signal;
mod types;

pub use bus::EventBus;
pub(crate) use signal::panic_message;
pub use signal::{Event, HandlerKey, Subscription};
pub use types::{FieldChange, KeyDown};
