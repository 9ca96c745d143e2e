//! MonoBehaviour update dispatch
//!
//! Hooks `MonoBehaviour::CallUpdateMethod` and turns every `Update` call
//! (method index 0) into a frame: queued tasks run, then `bus.update` fires.

use std::ffi::{c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use unihook_core::events::EventBus;
use unihook_core::features::{Feature, FeatureSection, FeatureState};
use unihook_core::function_hook;
use unihook_core::hooks::{HookFn, HookRegistry};
use unihook_core::tasks::TaskQueue;
use unihook_core::{Context, HookTarget};
use unihook_engine::ModuleResolver;

/// `CallUpdateMethod` index of `Update` (1 = LateUpdate, 2 = FixedUpdate)
const UPDATE_METHOD_INDEX: c_int = 0;

type CallUpdateMethodFn = unsafe extern "C" fn(*mut c_void, c_int);

function_hook! {
    static CALL_UPDATE_METHOD: unsafe extern "C" fn(this: *mut c_void, method_index: c_int);
}

/// Where the detour delivers frames
struct FrameSink {
    bus: Weak<EventBus>,
    tasks: Weak<TaskQueue>,
}

static SINK: RwLock<Option<FrameSink>> = RwLock::new(None);

unsafe extern "C" fn call_update_method_detour(this: *mut c_void, method_index: c_int) {
    call_update_method_original(this, method_index);
    after_update_method(method_index);
}

fn after_update_method(method_index: c_int) {
    if method_index != UPDATE_METHOD_INDEX {
        return;
    }

    // Never unwind into the game
    if catch_unwind(AssertUnwindSafe(dispatch_frame)).is_err() {
        tracing::error!("Panic during update dispatch");
    }
}

fn dispatch_frame() {
    let (bus, tasks) = match &*SINK.read() {
        Some(sink) => (sink.bus.upgrade(), sink.tasks.upgrade()),
        None => return,
    };

    if let Some(tasks) = tasks {
        tasks.process();
    }
    if let Some(bus) = bus {
        bus.update.emit(&());
    }
}

/// Hooks-section feature driving `bus.update` from the game's own update loop
pub struct UpdateDispatch {
    state: FeatureState,
    target: Option<HookTarget>,
    hooks: Weak<HookRegistry>,
    bus: Weak<EventBus>,
    tasks: Weak<TaskQueue>,
    hooked: AtomicBool,
}

impl UpdateDispatch {
    pub fn new(ctx: &Context, target: Option<HookTarget>) -> Arc<Self> {
        let state = FeatureState::with_enabled_default(
            &ctx.fields,
            &ctx.hotkeys,
            "UpdateDispatch",
            "Dispatch MonoBehaviour.Update to features",
            FeatureSection::Hooks,
            true,
        );

        Arc::new(Self {
            state,
            target,
            hooks: Arc::downgrade(&ctx.hooks),
            bus: Arc::downgrade(&ctx.bus),
            tasks: Arc::downgrade(&ctx.tasks),
            hooked: AtomicBool::new(false),
        })
    }

    fn resolve(hooks: &HookRegistry, target: &HookTarget) -> Option<CallUpdateMethodFn> {
        match hooks.modules().resolve(&target.module) {
            Ok(base) => {
                let Some(addr) = base.checked_add(target.offset) else {
                    tracing::warn!(
                        "CallUpdateMethod offset {:x} overflows {} at {:x}",
                        target.offset,
                        target.module,
                        base
                    );
                    return None;
                };
                // SAFETY: the configured offset names CallUpdateMethod in that module
                Some(unsafe { CallUpdateMethodFn::from_addr(addr as *const ()) })
            }
            Err(e) => {
                tracing::warn!(
                    "Cannot resolve CallUpdateMethod at {}+{:x}: {}",
                    target.module,
                    target.offset,
                    e
                );
                None
            }
        }
    }

    pub fn is_hooked(&self) -> bool {
        self.hooked.load(Ordering::Acquire)
    }
}

impl Feature for UpdateDispatch {
    fn state(&self) -> &FeatureState {
        &self.state
    }

    fn on_enable(&self) {
        let Some(target) = &self.target else {
            tracing::warn!("No update_hook configured in core.toml, update dispatch disabled");
            return;
        };
        let Some(hooks) = self.hooks.upgrade() else {
            return;
        };

        if CALL_UPDATE_METHOD
            .resolve(|| Self::resolve(&hooks, target))
            .is_none()
        {
            return;
        }

        *SINK.write() = Some(FrameSink {
            bus: self.bus.clone(),
            tasks: self.tasks.clone(),
        });

        if CALL_UPDATE_METHOD.set(&hooks, call_update_method_detour) {
            self.hooked.store(true, Ordering::Release);
            tracing::info!(
                "Update dispatch hooked at {}+{:x}",
                target.module,
                target.offset
            );
        } else {
            *SINK.write() = None;
        }
    }

    fn on_disable(&self) {
        if self.hooked.swap(false, Ordering::AcqRel) {
            if let Some(hooks) = self.hooks.upgrade() {
                CALL_UPDATE_METHOD.remove(&hooks);
            }
            *SINK.write() = None;
            tracing::info!("Update dispatch unhooked");
        }

        // The module may be loaded, or loaded elsewhere, by the next session
        if self.target.is_some() {
            CALL_UPDATE_METHOD.reset();
        }
    }
}
