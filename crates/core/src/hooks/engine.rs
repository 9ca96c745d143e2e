//! Low-level detour engine contract
//!
//! The [`HookRegistry`](super::HookRegistry) only ever talks to a detour
//! engine through these four calls plus the optional init/uninit pair.

/// Error type for low-level detour operations
#[derive(Debug, thiserror::Error)]
pub enum DetourError {
    #[error("Failed to allocate trampoline near {0:x}")]
    Allocation(usize),

    #[error("Failed to decode instructions at {0:x}")]
    Decode(usize),

    #[error("Function at {0:x} is too short to patch")]
    NotEnoughSpace(usize),

    #[error("Instruction relocation failed: {0}")]
    Relocation(String),

    #[error("Memory protection failed: {0}")]
    Unprotect(String),

    #[error("Detour already created for {0:x}")]
    AlreadyCreated(usize),

    #[error("No detour created for {0:x}")]
    NotCreated(usize),

    #[error("Invalid address: {0:x}")]
    Invalid(usize),

    #[error("Inline detours are not supported on this architecture")]
    Unsupported,
}

/// A backend able to redirect a function's entry to a detour
pub trait DetourEngine: Send + Sync {
    /// Prepare the engine; called once when the registry is built
    fn initialize(&self) -> Result<(), DetourError> {
        Ok(())
    }

    /// Prepare a detour from `target` to `detour` without activating it
    ///
    /// Returns the entry point that runs the un-hooked behaviour.
    ///
    /// # Safety
    /// - `target` must point at the first instruction of a function
    /// - `detour` must be a function with the same signature and ABI
    unsafe fn create(&self, target: *const (), detour: *const ()) -> Result<*const (), DetourError>;

    /// Redirect `target` to its detour
    fn enable(&self, target: *const ()) -> Result<(), DetourError>;

    /// Restore `target`'s original entry without forgetting the detour
    fn disable(&self, target: *const ()) -> Result<(), DetourError>;

    /// Restore `target` and release everything the detour owned
    fn remove(&self, target: *const ()) -> Result<(), DetourError>;

    /// Release engine-wide resources; called once on registry shutdown
    fn uninitialize(&self) {}
}
