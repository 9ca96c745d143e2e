//! Loaded module lookup
//!
//! Resolves a module name (`GameAssembly.dll`, `UnityPlayer.dll`, ...) to its
//! base address, optionally loading it first.

use std::ffi::CString;

use unihook_sdk::ScriptingBackend;

use crate::error::EngineError;

/// Resolves module names to base addresses
pub trait ModuleResolver: Send + Sync {
    /// Base address of an already-loaded module
    fn module_base(&self, name: &str) -> Option<usize>;

    /// Load a module and return its base address
    fn load_module(&self, name: &str) -> Option<usize>;

    /// Base address of a module, loading it if it is not present yet
    fn resolve(&self, name: &str) -> Result<usize, EngineError> {
        if let Some(base) = self.module_base(name) {
            return Ok(base);
        }

        tracing::debug!("Module '{}' not loaded, trying to load it", name);
        self.load_module(name)
            .ok_or_else(|| EngineError::ModuleNotFound(name.to_string()))
    }
}

/// Detect which scripting backend the host process uses
///
/// IL2CPP wins if both are somehow present.
pub fn detect_backend(modules: &dyn ModuleResolver) -> Option<ScriptingBackend> {
    [ScriptingBackend::Il2Cpp, ScriptingBackend::Mono]
        .into_iter()
        .find(|backend| {
            backend
                .module_names()
                .iter()
                .any(|name| modules.module_base(name).is_some())
        })
}

/// Module resolver backed by the operating system loader
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemModules;

fn c_name(name: &str) -> Option<CString> {
    match CString::new(name) {
        Ok(c) => Some(c),
        Err(_) => {
            tracing::warn!("{}", EngineError::InvalidName(name.to_string()));
            None
        }
    }
}

#[cfg(windows)]
impl ModuleResolver for SystemModules {
    fn module_base(&self, name: &str) -> Option<usize> {
        use windows::core::PCSTR;
        use windows::Win32::System::LibraryLoader::GetModuleHandleA;

        let name = c_name(name)?;
        let handle = unsafe { GetModuleHandleA(PCSTR(name.as_ptr() as *const u8)) }.ok()?;
        (!handle.is_invalid()).then(|| handle.0 as usize)
    }

    fn load_module(&self, name: &str) -> Option<usize> {
        use windows::core::PCSTR;
        use windows::Win32::System::LibraryLoader::LoadLibraryA;

        let c = c_name(name)?;
        match unsafe { LoadLibraryA(PCSTR(c.as_ptr() as *const u8)) } {
            Ok(handle) if !handle.is_invalid() => {
                tracing::info!("Loaded module '{}' at {:x}", name, handle.0 as usize);
                Some(handle.0 as usize)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("LoadLibraryA('{}') failed: {}", name, e);
                None
            }
        }
    }
}

#[cfg(unix)]
impl ModuleResolver for SystemModules {
    fn module_base(&self, name: &str) -> Option<usize> {
        use std::ffi::{c_int, c_void, CStr};

        struct Search<'a> {
            name: &'a str,
            found: Option<usize>,
        }

        unsafe extern "C" fn visit(
            info: *mut libc::dl_phdr_info,
            _size: usize,
            data: *mut c_void,
        ) -> c_int {
            let search = &mut *(data as *mut Search<'_>);
            let info = &*info;
            if info.dlpi_name.is_null() {
                return 0;
            }

            let path = CStr::from_ptr(info.dlpi_name).to_string_lossy();
            let file = path.rsplit('/').next().unwrap_or(path.as_ref());
            if path == search.name || file == search.name {
                search.found = Some(info.dlpi_addr as usize);
                return 1;
            }
            0
        }

        let mut search = Search { name, found: None };
        unsafe {
            libc::dl_iterate_phdr(Some(visit), &mut search as *mut Search<'_> as *mut c_void);
        }
        search.found
    }

    fn load_module(&self, name: &str) -> Option<usize> {
        let c = c_name(name)?;
        let handle = unsafe { libc::dlopen(c.as_ptr(), libc::RTLD_NOW) };
        if handle.is_null() {
            tracing::warn!("dlopen('{}') failed", name);
            return None;
        }

        // The handle is not the base; look the freshly mapped object up again.
        let base = self.module_base(name);
        if let Some(base) = base {
            tracing::info!("Loaded module '{}' at {:x}", name, base);
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeModules(HashMap<&'static str, usize>);

    impl ModuleResolver for FakeModules {
        fn module_base(&self, name: &str) -> Option<usize> {
            self.0.get(name).copied()
        }

        fn load_module(&self, _name: &str) -> Option<usize> {
            None
        }
    }

    #[test]
    fn test_detect_il2cpp() {
        let modules = FakeModules(HashMap::from([("GameAssembly.dll", 0x1000)]));
        assert_eq!(detect_backend(&modules), Some(ScriptingBackend::Il2Cpp));
    }

    #[test]
    fn test_detect_mono_either_name() {
        let bdwgc = FakeModules(HashMap::from([("mono-2.0-bdwgc.dll", 0x1000)]));
        let legacy = FakeModules(HashMap::from([("mono.dll", 0x1000)]));
        assert_eq!(detect_backend(&bdwgc), Some(ScriptingBackend::Mono));
        assert_eq!(detect_backend(&legacy), Some(ScriptingBackend::Mono));
    }

    #[test]
    fn test_detect_none() {
        let modules = FakeModules(HashMap::new());
        assert_eq!(detect_backend(&modules), None);
    }

    #[test]
    fn test_resolve_missing_module() {
        let modules = FakeModules(HashMap::new());
        assert!(matches!(
            modules.resolve("UnityPlayer.dll"),
            Err(EngineError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn test_system_modules_unknown_name() {
        assert_eq!(
            SystemModules.module_base("definitely-not-loaded-unihook.so"),
            None
        );
    }
}
