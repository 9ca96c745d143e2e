//! C-compatible exports called by the injector
//!
//! Every export catches panics; nothing unwinds across the ABI.

use std::ffi::{c_char, c_int, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use tracing::instrument;

// Plugin metadata - static strings with null terminators for C compatibility
static NAME: &[u8] = b"unihook\0";
static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();

/// Run `f`, mapping a panic to `fallback`
fn guarded<R>(name: &str, fallback: R, f: impl FnOnce() -> R) -> R {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("Panic in {}", name);
            fallback
        }
    }
}

/// Borrow a C string, `None` for null or invalid UTF-8
///
/// # Safety
/// `ptr` must be null or a valid null-terminated C string.
unsafe fn opt_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Attach to the host process
///
/// Idempotent; a second call returns true without rebuilding anything.
///
/// # Safety
/// - `config_dir` must be null (use the default directory) or a valid
///   null-terminated UTF-8 path
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn unihook_attach(config_dir: *const c_char) -> bool {
    let dir = opt_str(config_dir).filter(|dir| !dir.is_empty());

    guarded("unihook_attach", false, || match crate::attach(dir.map(Path::new)) {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("Failed to attach: {}", e);
            false
        }
    })
}

/// Shut down and release every hook
///
/// Returns false if nothing was attached or shutdown panicked.
#[no_mangle]
#[instrument(skip_all)]
pub extern "C" fn unihook_detach() -> bool {
    guarded("unihook_detach", false, crate::detach)
}

/// Forward a key press; returns true if a hotkey consumed it
#[no_mangle]
pub extern "C" fn unihook_on_key_down(vk: c_int) -> bool {
    guarded("unihook_on_key_down", false, || {
        crate::app().is_some_and(|app| app.ctx.key_down(vk))
    })
}

/// Frame entry for hosts without the update hook: queued tasks, then `update`
#[no_mangle]
pub extern "C" fn unihook_on_frame() {
    guarded("unihook_on_frame", (), || {
        if let Some(app) = crate::app() {
            app.ctx.frame();
        }
    })
}

/// Execute a control command and write the reply into `out`
///
/// Returns true if the command succeeded.
///
/// # Safety
/// - `msg` must be a valid null-terminated C string
/// - `out` must be null or a buffer of at least `out_len` bytes
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn unihook_control(msg: *const c_char, out: *mut c_char, out_len: usize) -> bool {
    let Some(msg) = opt_str(msg) else {
        write_str(out, out_len, "ERROR: Invalid format");
        return false;
    };

    let reply = guarded("unihook_control", None, || {
        crate::app().map(|app| app.ctx.features.apply_command(msg))
    })
    .unwrap_or_else(|| "ERROR: Not attached".to_string());

    write_str(out, out_len, &reply);
    reply.starts_with("OK")
}

/// Queue a switch to `name` for the next frame
///
/// Returns true if the switch was queued.
///
/// # Safety
/// - `name` must be a valid null-terminated C string
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn unihook_set_profile(name: *const c_char) -> bool {
    let Some(name) = opt_str(name).map(str::to_string) else {
        return false;
    };

    guarded("unihook_set_profile", false, || {
        let Some(app) = crate::app() else {
            return false;
        };

        let store = app.ctx.store.clone();
        app.ctx
            .tasks
            .queue(move || {
                store.set_profile(&name);
            })
            .is_ok()
    })
}

/// Write the active profile to disk now
#[no_mangle]
#[instrument(skip_all)]
pub extern "C" fn unihook_save() -> bool {
    guarded("unihook_save", false, || {
        let Some(app) = crate::app() else {
            return false;
        };

        match app.ctx.save() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save config: {}", e);
                false
            }
        }
    })
}

// Metadata exports - these return static strings for the injector to display

#[no_mangle]
pub extern "C" fn unihook_get_name() -> *const c_char {
    NAME.as_ptr() as *const c_char
}

#[no_mangle]
pub extern "C" fn unihook_get_version() -> *const c_char {
    VERSION.as_ptr() as *const c_char
}

/// Helper to write a message to a C buffer, truncating to fit
///
/// # Safety
/// - `out` must be a valid pointer or null
/// - `maxlen` must accurately reflect the buffer size
unsafe fn write_str(out: *mut c_char, maxlen: usize, msg: &str) {
    if !out.is_null() && maxlen > 0 {
        let bytes = msg.as_bytes();
        let len = bytes.len().min(maxlen - 1);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), out as *mut u8, len);
        *out.add(len) = 0;
    }
}
