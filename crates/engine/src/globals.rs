//! Global runtime state
//!
//! Detected once during attach and stored here. Access is thread-safe via
//! OnceLock.

use std::sync::OnceLock;
use std::thread::ThreadId;

use unihook_sdk::ScriptingBackend;

use crate::error::EngineError;
use crate::module::{detect_backend, ModuleResolver};

/// Process-wide facts about the host game
#[derive(Debug, Clone)]
pub struct RuntimeGlobals {
    /// Scripting backend the game was built with
    pub backend: ScriptingBackend,

    /// Base of the backend's main module (`GameAssembly.dll` / mono)
    pub backend_module: usize,

    /// Thread that attached us; treated as the main thread
    pub main_thread_id: ThreadId,
}

static RUNTIME: OnceLock<RuntimeGlobals> = OnceLock::new();

impl RuntimeGlobals {
    /// Detect the backend through `modules`, recording the current thread as main
    pub fn detect(modules: &dyn ModuleResolver) -> Result<Self, EngineError> {
        let backend = detect_backend(modules).ok_or(EngineError::BackendNotDetected)?;
        let backend_module = backend
            .module_names()
            .iter()
            .find_map(|name| modules.module_base(name))
            .ok_or(EngineError::BackendNotDetected)?;

        tracing::info!("Detected {} backend at {:x}", backend, backend_module);

        Ok(Self {
            backend,
            backend_module,
            main_thread_id: std::thread::current().id(),
        })
    }
}

/// Initialize runtime globals
///
/// Called once during attach. Returns error if already initialized.
pub fn init_runtime(globals: RuntimeGlobals) -> Result<(), EngineError> {
    RUNTIME
        .set(globals)
        .map_err(|_| EngineError::AlreadyInitialized)
}

/// Get runtime globals
///
/// # Errors
/// [`EngineError::NotInitialized`] if called before [`init_runtime`]
pub fn runtime() -> Result<&'static RuntimeGlobals, EngineError> {
    RUNTIME.get().ok_or(EngineError::NotInitialized)
}

/// Get runtime globals, `None` before [`init_runtime`]
pub fn try_runtime() -> Option<&'static RuntimeGlobals> {
    RUNTIME.get()
}

/// Check if runtime globals are initialized
pub fn is_runtime_initialized() -> bool {
    RUNTIME.get().is_some()
}

/// Check if current thread is the thread that attached us
pub fn is_main_thread() -> bool {
    RUNTIME
        .get()
        .map(|g| std::thread::current().id() == g.main_thread_id)
        .unwrap_or(false)
}
