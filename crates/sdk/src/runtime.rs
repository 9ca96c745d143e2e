//! Unity scripting runtime type definitions
//!
//! These are opaque handles into the scripting runtime's metadata. We never
//! look inside them; the reflection walker hands them back and forth.

use std::fmt;

/// Which scripting backend the game was built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptingBackend {
    /// Ahead-of-time compiled (`GameAssembly.dll`)
    Il2Cpp,
    /// JIT runtime (`mono-2.0-bdwgc.dll` / `mono.dll`)
    Mono,
}

impl ScriptingBackend {
    /// Module that identifies this backend in the host process
    pub const fn module_names(self) -> &'static [&'static str] {
        match self {
            ScriptingBackend::Il2Cpp => &["GameAssembly.dll"],
            ScriptingBackend::Mono => &["mono-2.0-bdwgc.dll", "mono.dll"],
        }
    }
}

impl fmt::Display for ScriptingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptingBackend::Il2Cpp => f.write_str("IL2CPP"),
            ScriptingBackend::Mono => f.write_str("Mono"),
        }
    }
}

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        pub struct $name(pub usize);

        impl $name {
            /// Raw pointer value
            pub const fn addr(self) -> usize {
                self.0
            }
        }
    };
}

opaque_handle!(
    /// Opaque `Il2CppClass*` / `MonoClass*`
    ClassHandle
);
opaque_handle!(
    /// Opaque `MethodInfo*` / `MonoMethod*`
    MethodHandle
);
opaque_handle!(
    /// Opaque `FieldInfo*` / `MonoClassField*`
    FieldHandle
);
