//! Hook system
//!
//! Layers, bottom-up:
//! - [`DetourEngine`]: the contract a low-level detour backend fulfils
//! - [`InlineDetourEngine`]: x86-64 entry patching via iced-x86
//! - [`HookRegistry`]: owns every installed hook and its trampoline
//! - [`FunctionHook`]: typed, call-compatible view over one hook

pub mod engine;
pub mod function;
pub mod inline;
pub mod registry;
pub mod trampoline;

pub use engine::{DetourEngine, DetourError};
pub use function::{Fallback, FunctionHook, HookFn};
pub use inline::InlineDetourEngine;
pub use registry::{HookError, HookRecord, HookRegistry, ModuleOffset};
