//! unihook SDK - Host Type Definitions
//!
//! This crate contains plain type definitions shared by every other crate:
//! virtual-key codes for the input hook and opaque handles for the Unity
//! scripting runtime. It has no dependencies and compiles quickly.
//!
//! # Modules
//!
//! - [`keys`] - Virtual-key codes and display names
//! - [`runtime`] - Scripting backend kind and opaque metadata handles

pub mod keys;
pub mod runtime;

pub use keys::{key_list, key_name, Vk};
pub use runtime::{ClassHandle, FieldHandle, MethodHandle, ScriptingBackend};
