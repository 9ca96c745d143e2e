//! Typed function hooks
//!
//! A [`FunctionHook`] is a call-compatible handle to one native function. It
//! starts out unresolved, becomes callable once a target is bound, and
//! transparently calls through the trampoline once a detour is installed.
//!
//! # Example
//!
//! ```ignore
//! use unihook_core::function_hook;
//!
//! function_hook! {
//!     /// PlayerController::Update(this)
//!     pub static PLAYER_UPDATE: unsafe extern "C" fn(this: *mut c_void);
//! }
//!
//! unsafe extern "C" fn player_update_detour(this: *mut c_void) {
//!     // Pre-hook logic
//!     player_update_original(this);
//! }
//!
//! let addr = cache.method_address(&walker, "Assembly-CSharp", "PlayerController", "Update");
//! PLAYER_UPDATE.resolve(|| addr.map(|a| unsafe { HookFn::from_addr(a as *const ()) }));
//! PLAYER_UPDATE.set(&ctx.hooks, player_update_detour);
//! ```

use parking_lot::RwLock;

use super::registry::HookRegistry;

/// Function pointer types a [`FunctionHook`] can bind to
///
/// # Safety
/// Implementors must be plain function pointers so that converting to and
/// from an address is lossless.
pub unsafe trait HookFn: Copy + Send + Sync + 'static {
    /// Argument tuple
    type Args;
    /// Return type
    type Output;

    fn addr(self) -> *const ();

    /// Reinterpret an address as this function type
    ///
    /// # Safety
    /// `addr` must be a function with exactly this signature and ABI.
    unsafe fn from_addr(addr: *const ()) -> Self;

    /// Call the function with an argument tuple
    ///
    /// # Safety
    /// The arguments must satisfy the callee's contract.
    unsafe fn invoke(self, args: Self::Args) -> Self::Output;
}

macro_rules! impl_hook_fn {
    ($($arg:ident),*) => {
        impl_hook_fn!(@abi [] $($arg),*);
        impl_hook_fn!(@abi [extern "C"] $($arg),*);
        impl_hook_fn!(@abi [extern "system"] $($arg),*);
    };
    (@abi [$($abi:tt)*] $($arg:ident),*) => {
        impl_hook_fn!(@one [$($abi)*] $($arg),*);
        impl_hook_fn!(@one [unsafe $($abi)*] $($arg),*);
    };
    (@one [$($qual:tt)*] $($arg:ident),*) => {
        unsafe impl<R: 'static, $($arg: 'static),*> HookFn for $($qual)* fn($($arg),*) -> R {
            type Args = ($($arg,)*);
            type Output = R;

            fn addr(self) -> *const () {
                self as *const ()
            }

            unsafe fn from_addr(addr: *const ()) -> Self {
                debug_assert_eq!(std::mem::size_of::<Self>(), std::mem::size_of::<*const ()>());
                std::mem::transmute_copy(&addr)
            }

            #[allow(non_snake_case)]
            unsafe fn invoke(self, args: Self::Args) -> R {
                let ($($arg,)*) = args;
                (self)($($arg),*)
            }
        }
    };
}

impl_hook_fn!();
impl_hook_fn!(A1);
impl_hook_fn!(A1, A2);
impl_hook_fn!(A1, A2, A3);
impl_hook_fn!(A1, A2, A3, A4);
impl_hook_fn!(A1, A2, A3, A4, A5);
impl_hook_fn!(A1, A2, A3, A4, A5, A6);
impl_hook_fn!(A1, A2, A3, A4, A5, A6, A7);
impl_hook_fn!(A1, A2, A3, A4, A5, A6, A7, A8);

/// Value returned by [`FunctionHook::call`] when nothing is bound
pub trait Fallback {
    fn fallback() -> Self;
}

macro_rules! impl_fallback_zero {
    ($($ty:ty),*) => {
        $(impl Fallback for $ty {
            fn fallback() -> Self {
                0 as $ty
            }
        })*
    };
}

impl_fallback_zero!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl Fallback for () {
    fn fallback() -> Self {}
}

impl Fallback for bool {
    fn fallback() -> Self {
        false
    }
}

impl<T> Fallback for *const T {
    fn fallback() -> Self {
        std::ptr::null()
    }
}

impl<T> Fallback for *mut T {
    fn fallback() -> Self {
        std::ptr::null_mut()
    }
}

impl<T> Fallback for Option<T> {
    fn fallback() -> Self {
        None
    }
}

struct HookState<F> {
    target: Option<F>,
    detour: Option<F>,
    original: Option<F>,
    active: bool,
    resolve_attempted: bool,
}

/// Strongly-typed view over one hook
pub struct FunctionHook<F: HookFn> {
    state: RwLock<HookState<F>>,
}

impl<F: HookFn> Default for FunctionHook<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: HookFn> FunctionHook<F> {
    /// Unresolved hook; `call` returns the fallback value until a target is bound
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(HookState {
                target: None,
                detour: None,
                original: None,
                active: false,
                resolve_attempted: false,
            }),
        }
    }

    /// Hook bound to a known function
    pub const fn with_target(target: F) -> Self {
        Self {
            state: RwLock::new(HookState {
                target: Some(target),
                detour: None,
                original: None,
                active: false,
                resolve_attempted: true,
            }),
        }
    }

    /// Bind the target; ignored once a target is bound or the hook is active
    pub fn target(&self, target: F) {
        let mut state = self.state.write();
        if state.target.is_some() || state.active {
            tracing::debug!(
                "Ignoring rebind of function hook to {:x}",
                target.addr() as usize
            );
            return;
        }
        state.target = Some(target);
        state.resolve_attempted = true;
    }

    /// Bind the target lazily
    ///
    /// `resolver` runs at most once until [`reset`](Self::reset); a `None`
    /// result is remembered and the hook stays unresolved.
    pub fn resolve(&self, resolver: impl FnOnce() -> Option<F>) -> Option<F> {
        {
            let mut state = self.state.write();
            if state.target.is_some() || state.resolve_attempted {
                return state.target;
            }
            state.resolve_attempted = true;
        }

        let resolved = resolver();
        match resolved {
            Some(target) => self.target(target),
            None => tracing::warn!("Function hook target could not be resolved"),
        }
        self.state.read().target
    }

    /// Forget the bound target and any remembered resolution miss
    ///
    /// Refused while the detour is installed. The next
    /// [`resolve`](Self::resolve) runs its resolver again.
    pub fn reset(&self) -> bool {
        let mut state = self.state.write();
        if state.active {
            return false;
        }
        state.target = None;
        state.resolve_attempted = false;
        true
    }

    /// Install `detour` over the bound target
    ///
    /// Returns false if already active, unbound, or the registry refuses.
    pub fn set(&self, registry: &HookRegistry, detour: F) -> bool {
        let mut state = self.state.write();
        if state.active {
            return false;
        }
        let Some(target) = state.target else {
            tracing::warn!("Cannot hook unresolved function");
            return false;
        };

        // SAFETY: target and detour share the signature F
        match unsafe { registry.install(target.addr(), detour.addr()) } {
            Ok(original) => {
                state.original = Some(unsafe { F::from_addr(original) });
                state.detour = Some(detour);
                state.active = true;
                true
            }
            Err(e) => {
                tracing::error!(
                    "Failed to hook function at {:x}: {}",
                    target.addr() as usize,
                    e
                );
                false
            }
        }
    }

    /// Call the original function
    ///
    /// Dispatches to the trampoline when active, to the raw target when only
    /// bound, and returns [`Fallback::fallback`] when unresolved.
    ///
    /// # Safety
    /// The arguments must satisfy the bound function's contract.
    pub unsafe fn call(&self, args: F::Args) -> F::Output
    where
        F::Output: Fallback,
    {
        let callee = {
            let state = self.state.read();
            state.original.or(state.target)
        };

        match callee {
            Some(f) => f.invoke(args),
            None => <F::Output as Fallback>::fallback(),
        }
    }

    /// Uninstall the detour, returning to "resolved but inactive"
    pub fn remove(&self, registry: &HookRegistry) -> bool {
        let mut state = self.state.write();
        if !state.active {
            return true;
        }
        let Some(target) = state.target else {
            return false;
        };

        if let Err(e) = registry.uninstall(target.addr()) {
            tracing::error!(
                "Failed to unhook function at {:x}: {}",
                target.addr() as usize,
                e
            );
            return false;
        }

        state.active = false;
        state.detour = None;
        state.original = None;
        true
    }

    /// Toggle the installed detour without removing it
    pub fn enable(&self, registry: &HookRegistry, enable: bool) -> bool {
        let Some(target) = self.state.read().target else {
            return false;
        };

        let result = if enable {
            registry.enable_hook(target.addr())
        } else {
            registry.disable_hook(target.addr())
        };

        result
            .map_err(|e| tracing::warn!("Failed to toggle function hook: {}", e))
            .is_ok()
    }

    pub fn disable(&self, registry: &HookRegistry) -> bool {
        self.enable(registry, false)
    }

    pub fn is_active(&self) -> bool {
        self.state.read().active
    }

    pub fn has_target(&self) -> bool {
        self.state.read().target.is_some()
    }

    pub fn target_fn(&self) -> Option<F> {
        self.state.read().target
    }

    /// Trampoline to the pre-hook behaviour, when active
    pub fn original(&self) -> Option<F> {
        self.state.read().original
    }

    pub fn detour(&self) -> Option<F> {
        self.state.read().detour
    }
}

/// Declare a static [`FunctionHook`] and an `<name>_original` helper that
/// calls through it
///
/// ```ignore
/// function_hook! {
///     pub static CALL_UPDATE: unsafe extern "C" fn(this: *mut c_void, method: i32);
/// }
///
/// // Generated:
/// // pub static CALL_UPDATE: FunctionHook<unsafe extern "C" fn(*mut c_void, i32)>;
/// // pub unsafe fn call_update_original(this: *mut c_void, method: i32);
/// ```
#[macro_export]
macro_rules! function_hook {
    (
        $(#[$meta:meta])*
        $vis:vis static $name:ident: unsafe extern $abi:literal fn($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;
    ) => {
        $crate::function_hook!(@emit [$(#[$meta])*] $vis $name [unsafe extern $abi] ($($arg: $ty),*) ($($ret)?));
    };
    (
        $(#[$meta:meta])*
        $vis:vis static $name:ident: extern $abi:literal fn($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;
    ) => {
        $crate::function_hook!(@emit [$(#[$meta])*] $vis $name [extern $abi] ($($arg: $ty),*) ($($ret)?));
    };
    (@emit [$($meta:tt)*] $vis:vis $name:ident [$($qual:tt)*] ($($arg:ident: $ty:ty),*) ($($ret:ty)?)) => {
        $($meta)*
        $vis static $name: $crate::hooks::FunctionHook<$($qual)* fn($($ty),*) $(-> $ret)?> =
            $crate::hooks::FunctionHook::new();

        $crate::paste::paste! {
            /// Call the original function behind
            #[doc = concat!("[`", stringify!($name), "`]")]
            ///
            /// # Safety
            /// Arguments must satisfy the hooked function's contract.
            #[allow(dead_code)]
            $vis unsafe fn [<$name:lower _original>]($($arg: $ty),*) $(-> $ret)? {
                $name.call(($($arg,)*))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::registry::tests::mock_registry;

    extern "C" fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    extern "C" fn add_detour(a: i32, b: i32) -> i32 {
        (a + b) * 100
    }

    type AddFn = extern "C" fn(i32, i32) -> i32;

    #[test]
    fn test_unresolved_returns_fallback() {
        let hook = FunctionHook::<AddFn>::new();
        assert_eq!(unsafe { hook.call((1, 2)) }, 0);

        let ptr_hook = FunctionHook::<extern "C" fn() -> *mut u8>::new();
        assert!(unsafe { ptr_hook.call(()) }.is_null());
    }

    #[test]
    fn test_bound_target_is_called_directly() {
        let hook = FunctionHook::<AddFn>::with_target(add);
        assert_eq!(unsafe { hook.call((2, 3)) }, 5);
        assert!(!hook.is_active());
    }

    #[test]
    fn test_target_binds_once() {
        let hook = FunctionHook::<AddFn>::new();
        hook.target(add);
        hook.target(add_detour);
        assert_eq!(hook.target_fn().map(HookFn::addr), Some(add as AddFn).map(HookFn::addr));
    }

    #[test]
    fn test_set_requires_target() {
        let (_engine, registry) = mock_registry();
        let hook = FunctionHook::<AddFn>::new();
        assert!(!hook.set(&registry, add_detour));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_call_goes_through_original() {
        let (_engine, registry) = mock_registry();
        let hook = FunctionHook::<AddFn>::with_target(add);

        assert!(hook.set(&registry, add_detour));
        assert!(hook.is_active());
        // Mock engine's trampoline is the target itself: the pre-hook original
        assert_eq!(unsafe { hook.call((20, 22)) }, 42);
        assert_eq!(
            hook.original().map(HookFn::addr),
            Some(add as AddFn).map(HookFn::addr)
        );

        // Already active
        assert!(!hook.set(&registry, add_detour));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_returns_to_resolved() {
        let (_engine, registry) = mock_registry();
        let hook = FunctionHook::<AddFn>::with_target(add);
        hook.set(&registry, add_detour);

        assert!(hook.remove(&registry));
        assert!(!hook.is_active());
        assert!(hook.has_target());
        assert!(hook.original().is_none());
        assert!(registry.is_empty());

        // Can be installed again
        assert!(hook.set(&registry, add_detour));
    }

    #[test]
    fn test_enable_without_target_is_noop() {
        let (_engine, registry) = mock_registry();
        let hook = FunctionHook::<AddFn>::new();
        assert!(!hook.enable(&registry, true));
        assert!(!hook.disable(&registry));
    }

    #[test]
    fn test_enable_disable_pass_through() {
        let (_engine, registry) = mock_registry();
        let hook = FunctionHook::<AddFn>::with_target(add);
        hook.set(&registry, add_detour);

        assert!(hook.disable(&registry));
        assert!(!registry.is_enabled(add as *const ()));
        assert!(hook.enable(&registry, true));
        assert!(registry.is_enabled(add as *const ()));
    }

    #[test]
    fn test_resolve_runs_once() {
        let hook = FunctionHook::<AddFn>::new();
        let mut calls = 0;

        assert!(hook
            .resolve(|| {
                calls += 1;
                None
            })
            .is_none());
        assert!(hook
            .resolve(|| {
                calls += 1;
                Some(add)
            })
            .is_none());
        assert_eq!(calls, 1);
        assert_eq!(unsafe { hook.call((1, 1)) }, 0);
    }

    #[test]
    fn test_reset_allows_resolving_again() {
        let (_engine, registry) = mock_registry();
        let hook = FunctionHook::<AddFn>::new();
        assert!(hook.resolve(|| None).is_none());

        assert!(hook.reset());
        assert!(hook.resolve(|| Some(add)).is_some());

        hook.set(&registry, add_detour);
        assert!(!hook.reset());
        assert!(hook.has_target());

        hook.remove(&registry);
        assert!(hook.reset());
        assert!(!hook.has_target());
        assert_eq!(unsafe { hook.call((1, 1)) }, 0);
    }

    #[test]
    fn test_resolve_memoizes_target() {
        let hook = FunctionHook::<AddFn>::new();
        assert!(hook.resolve(|| Some(add)).is_some());
        assert_eq!(unsafe { hook.call((4, 5)) }, 9);
    }

    crate::function_hook! {
        static MACRO_HOOK: extern "C" fn(a: i32, b: i32) -> i32;
    }

    #[test]
    fn test_macro_declared_hook() {
        assert_eq!(unsafe { macro_hook_original(1, 2) }, 0);
        MACRO_HOOK.target(add);
        assert_eq!(unsafe { macro_hook_original(1, 2) }, 3);
    }
}
