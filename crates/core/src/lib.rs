//! unihook core
//!
//! Hooking, reactive configuration and the feature framework for runtime
//! modding of Unity games.
//!
//! # Re-exports
//!
//! This crate re-exports the SDK and engine crates for convenience:
//! - [`sdk`] - Key codes and scripting-runtime handle types
//! - [`engine`] - Module resolution, metadata resolution and runtime globals
//!
//! # Example
//!
//! ```ignore
//! use unihook_core::{Context, ContextOptions};
//!
//! let ctx = Context::new(ContextOptions::new(config_dir))?;
//! ctx.register_feature(Arc::new(Fly::new(&ctx)));
//! ctx.features.init();
//!
//! // every frame
//! ctx.frame();
//! ```

// Re-export SDK and engine crates
pub use unihook_engine as engine;
pub use unihook_sdk as sdk;

#[doc(hidden)]
pub use paste;

pub mod config;
pub mod context;
pub mod control;
pub mod events;
pub mod features;
pub mod fields;
pub mod hooks;
pub mod hotkey;
pub mod tasks;

pub use config::{ConfigError, ConfigResult, ConfigStore, CoreConfig, HookTarget, LoadOutcome};
pub use context::{Context, ContextOptions};
pub use control::{ControlAction, ControlCommand, ControlError};
pub use events::{Event, EventBus, FieldChange, KeyDown, Subscription};
pub use features::{Click, Feature, FeatureManager, FeatureSection, FeatureState, Ui};
pub use fields::{ConfigObject, Field, FieldRegistry};
pub use hooks::{DetourEngine, FunctionHook, HookError, HookRegistry, InlineDetourEngine};
pub use hotkey::{HotkeyField, HotkeyManager};
pub use tasks::{TaskError, TaskQueue};

/// Crate version, reported through the C ABI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
