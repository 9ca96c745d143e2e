//! unihook Engine - Host Process Collaborators
//!
//! This crate handles:
//! - Resolving loaded modules by name (loading them if necessary)
//! - The reflection/metadata walker contract and its memoizing cache
//! - Detecting the scripting backend and storing process-wide runtime state
//!
//! # Architecture
//!
//! Runtime state is detected once during attach via [`module::detect_backend`]
//! and stored in [`globals::RuntimeGlobals`]. Access is provided via
//! [`runtime()`], or [`try_runtime()`] where a missing runtime is expected.
//!
//! # Thread Safety
//!
//! Module bases are valid for as long as the module stays loaded. The attach
//! thread ID is stored for runtime checks via [`is_main_thread()`].

pub mod error;
pub mod globals;
pub mod module;
pub mod resolver;

pub use error::EngineError;
pub use globals::{
    init_runtime, is_main_thread, is_runtime_initialized, runtime, try_runtime, RuntimeGlobals,
};
pub use module::{detect_backend, ModuleResolver, SystemModules};
pub use resolver::{MetadataResolver, ResolverCache};
