//! Process-wide hook registry
//!
//! Tracks every installed interception by target address and maps each
//! detour back to its original entry point. At most one record exists per
//! target; a failed operation never leaves a partial record behind.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use unihook_engine::ModuleResolver;

use super::engine::{DetourEngine, DetourError};

/// Error type for hook operations
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Target address is null")]
    NullTarget,

    #[error("Detour address is null")]
    NullDetour,

    #[error("Target {0:x} is already hooked")]
    AlreadyHooked(usize),

    #[error("Detour {0:x} is already installed on another target")]
    DetourInUse(usize),

    #[error("No hook installed at {0:x}")]
    NotFound(usize),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Offset {offset:x} overflows the base of {module}")]
    InvalidTarget { module: String, offset: usize },

    #[error("Hook registry is shut down")]
    ShutDown,

    #[error(transparent)]
    Engine(#[from] DetourError),
}

/// Where a target came from when it was resolved as module + offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOffset {
    pub module: String,
    pub offset: usize,
}

/// One installed interception
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRecord {
    pub target: usize,
    pub detour: usize,
    /// Entry point that runs the pre-hook behaviour
    pub original: usize,
    pub enabled: bool,
    pub module: Option<ModuleOffset>,
}

#[derive(Default)]
struct RegistryState {
    records: HashMap<usize, HookRecord>,
    /// detour -> original
    originals: HashMap<usize, usize>,
    shut_down: bool,
}

/// Table of installed hooks backed by a [`DetourEngine`]
pub struct HookRegistry {
    engine: Arc<dyn DetourEngine>,
    modules: Arc<dyn ModuleResolver>,
    state: Mutex<RegistryState>,
}

impl HookRegistry {
    /// Create a registry, initializing the detour engine
    pub fn new(
        engine: Arc<dyn DetourEngine>,
        modules: Arc<dyn ModuleResolver>,
    ) -> Result<Self, HookError> {
        engine.initialize()?;
        tracing::debug!("Hook registry initialized");

        Ok(Self {
            engine,
            modules,
            state: Mutex::new(RegistryState::default()),
        })
    }

    /// Resolver used for module + offset targets
    pub fn modules(&self) -> &Arc<dyn ModuleResolver> {
        &self.modules
    }

    /// Install and enable a hook on `target`
    ///
    /// # Safety
    /// - `target` must be the entry of a function
    /// - `detour` must have the same signature and calling convention
    ///
    /// # Returns
    /// The entry point that invokes the original function
    pub unsafe fn install(
        &self,
        target: *const (),
        detour: *const (),
    ) -> Result<*const (), HookError> {
        self.install_record(target, detour, None)
    }

    /// Install and enable a hook on `module` base + `offset`
    ///
    /// The module is loaded if it is not present yet.
    ///
    /// # Safety
    /// Same as [`install`](Self::install) for the resolved address.
    pub unsafe fn install_at_module(
        &self,
        module: &str,
        offset: usize,
        detour: *const (),
    ) -> Result<*const (), HookError> {
        let base = self.modules.resolve(module).map_err(|e| {
            tracing::error!("Cannot hook {}+{:x}: {}", module, offset, e);
            HookError::ModuleNotFound(module.to_string())
        })?;

        let Some(target) = base.checked_add(offset) else {
            tracing::error!("Cannot hook {}+{:x}: address overflows", module, offset);
            return Err(HookError::InvalidTarget {
                module: module.to_string(),
                offset,
            });
        };

        let descriptor = ModuleOffset {
            module: module.to_string(),
            offset,
        };
        self.install_record(target as *const (), detour, Some(descriptor))
    }

    unsafe fn install_record(
        &self,
        target: *const (),
        detour: *const (),
        module: Option<ModuleOffset>,
    ) -> Result<*const (), HookError> {
        if target.is_null() {
            return Err(HookError::NullTarget);
        }
        if detour.is_null() {
            return Err(HookError::NullDetour);
        }

        let target_addr = target as usize;
        let detour_addr = detour as usize;

        let mut state = self.state.lock();
        if state.shut_down {
            return Err(HookError::ShutDown);
        }
        if state.records.contains_key(&target_addr) {
            tracing::warn!("Rejecting duplicate hook at {:x}", target_addr);
            return Err(HookError::AlreadyHooked(target_addr));
        }
        if state.originals.contains_key(&detour_addr) {
            tracing::warn!("Rejecting reuse of detour {:x}", detour_addr);
            return Err(HookError::DetourInUse(detour_addr));
        }

        let original = self.engine.create(target, detour).map_err(|e| {
            tracing::error!("Failed to create hook at {:x}: {}", target_addr, e);
            HookError::from(e)
        })?;

        if let Err(e) = self.engine.enable(target) {
            tracing::error!("Failed to enable hook at {:x}: {}", target_addr, e);
            let _ = self.engine.disable(target);
            if let Err(e) = self.engine.remove(target) {
                tracing::error!("Rollback of hook at {:x} failed: {}", target_addr, e);
            }
            return Err(e.into());
        }

        let original_addr = original as usize;
        state.records.insert(
            target_addr,
            HookRecord {
                target: target_addr,
                detour: detour_addr,
                original: original_addr,
                enabled: true,
                module,
            },
        );
        state.originals.insert(detour_addr, original_addr);

        tracing::info!(
            "Installed hook at {:x} -> {:x} (original {:x})",
            target_addr,
            detour_addr,
            original_addr
        );
        Ok(original)
    }

    /// Disable and remove the hook on `target`
    pub fn uninstall(&self, target: *const ()) -> Result<(), HookError> {
        let target_addr = target as usize;
        let mut state = self.state.lock();
        let record = state
            .records
            .get_mut(&target_addr)
            .ok_or(HookError::NotFound(target_addr))?;

        if record.enabled {
            self.engine.disable(target)?;
            record.enabled = false;
        }
        self.engine.remove(target)?;

        if let Some(record) = state.records.remove(&target_addr) {
            state.originals.remove(&record.detour);
        }

        tracing::info!("Removed hook at {:x}", target_addr);
        Ok(())
    }

    /// Re-activate a disabled hook; no-op if already enabled
    pub fn enable_hook(&self, target: *const ()) -> Result<(), HookError> {
        self.set_enabled(target, true)
    }

    /// Deactivate a hook without removing it; no-op if already disabled
    pub fn disable_hook(&self, target: *const ()) -> Result<(), HookError> {
        self.set_enabled(target, false)
    }

    fn set_enabled(&self, target: *const (), enabled: bool) -> Result<(), HookError> {
        let target_addr = target as usize;
        let mut state = self.state.lock();
        let record = state
            .records
            .get_mut(&target_addr)
            .ok_or(HookError::NotFound(target_addr))?;

        if record.enabled == enabled {
            return Ok(());
        }

        if enabled {
            self.engine.enable(target)?;
        } else {
            self.engine.disable(target)?;
        }
        record.enabled = enabled;

        tracing::info!(
            "{} hook at {:x}",
            if enabled { "Enabled" } else { "Disabled" },
            target_addr
        );
        Ok(())
    }

    /// Original entry point for a detour, if that detour is installed
    pub fn get_original(&self, detour: *const ()) -> Option<*const ()> {
        self.state
            .lock()
            .originals
            .get(&(detour as usize))
            .map(|&original| original as *const ())
    }

    pub fn is_installed(&self, target: *const ()) -> bool {
        self.state.lock().records.contains_key(&(target as usize))
    }

    pub fn is_enabled(&self, target: *const ()) -> bool {
        self.state
            .lock()
            .records
            .get(&(target as usize))
            .map(|r| r.enabled)
            .unwrap_or(false)
    }

    /// Copy of every record, ordered by target address
    pub fn records(&self) -> Vec<HookRecord> {
        let mut records: Vec<_> = self.state.lock().records.values().cloned().collect();
        records.sort_by_key(|r| r.target);
        records
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disable and remove every hook, then release the engine
    ///
    /// Best-effort: individual failures are logged and skipped.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.shut_down {
            return;
        }

        let count = state.records.len();
        for (target, record) in state.records.drain() {
            let ptr = target as *const ();
            if record.enabled {
                if let Err(e) = self.engine.disable(ptr) {
                    tracing::warn!("Failed to disable hook at {:x}: {}", target, e);
                }
            }
            if let Err(e) = self.engine.remove(ptr) {
                tracing::warn!("Failed to remove hook at {:x}: {}", target, e);
            }
        }
        state.originals.clear();
        state.shut_down = true;

        self.engine.uninitialize();
        tracing::info!("Hook registry shut down ({} hooks removed)", count);
    }
}

impl Drop for HookRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
