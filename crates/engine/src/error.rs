//! Error types for host process lookups

/// Error type for engine-level operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Module is not loaded and could not be loaded
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// Name contains an interior NUL byte
    #[error("Invalid module name: {0}")]
    InvalidName(String),

    /// Neither IL2CPP nor Mono is present in the process
    #[error("No scripting backend detected")]
    BackendNotDetected,

    /// Runtime globals already initialized
    #[error("Runtime already initialized")]
    AlreadyInitialized,

    /// Runtime globals read before attach
    #[error("Runtime not initialized")]
    NotInitialized,
}
