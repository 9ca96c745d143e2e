//! unihook plugin - injector entry points
//!
//! This crate compiles to the cdylib an external injector loads into the
//! game. It owns the single attached [`App`] and exposes it through the C ABI
//! in [`ffi`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use unihook_core::config::paths;
use unihook_core::{ConfigError, Context, ContextOptions, CoreConfig, HookError};
use unihook_engine::{init_runtime, RuntimeGlobals, SystemModules};

pub mod ffi;
mod logging;
mod update;

pub use update::UpdateDispatch;

/// Error type for attach
#[derive(Debug, Error)]
pub enum AttachError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Hook(#[from] HookError),
}

/// One attached session
pub struct App {
    pub ctx: Context,
    pub config: CoreConfig,
    pub config_dir: PathBuf,
}

impl App {
    /// Build the context, register the built-in features and initialize them
    pub fn new(options: ContextOptions, config: CoreConfig) -> Result<Self, HookError> {
        let config_dir = options.config_dir.clone();
        let ctx = Context::new(options)?;

        ctx.register_feature(UpdateDispatch::new(&ctx, config.update_hook.clone()));
        ctx.features.init();

        Ok(Self {
            ctx,
            config,
            config_dir,
        })
    }
}

static APP: Mutex<Option<Arc<App>>> = Mutex::new(None);

/// The attached session, if any
pub fn app() -> Option<Arc<App>> {
    APP.lock().clone()
}

/// Attach to the host process
///
/// Resolves the config directory, installs logging, detects the scripting
/// backend and builds the [`App`]. Attaching twice returns the existing
/// session.
pub fn attach(config_dir: Option<&Path>) -> Result<Arc<App>, AttachError> {
    let mut slot = APP.lock();
    if let Some(app) = slot.as_ref() {
        tracing::info!("Already attached");
        return Ok(Arc::clone(app));
    }

    let dir = paths::base_dir(config_dir)?;
    let config = CoreConfig::load(&dir).unwrap_or_else(|e| {
        eprintln!("unihook: failed to load core config, using defaults: {}", e);
        CoreConfig::default()
    });

    if !logging::init(&config, &dir) {
        tracing::debug!("Log subscriber already installed");
    }
    tracing::info!("unihook {} attaching, config dir {:?}", unihook_core::VERSION, dir);

    match RuntimeGlobals::detect(&SystemModules) {
        Ok(globals) => {
            if let Err(e) = init_runtime(globals) {
                tracing::debug!("Runtime globals kept from a previous attach: {}", e);
            }
        }
        Err(e) => tracing::warn!("{}", e),
    }

    let options = ContextOptions::new(&dir).with_debounce(config.save_debounce());
    let app = Arc::new(App::new(options, config)?);
    *slot = Some(Arc::clone(&app));

    tracing::info!("unihook attached, main thread {:?}", std::thread::current().id());
    Ok(app)
}

/// Shut the session down; returns false if nothing was attached
pub fn detach() -> bool {
    let Some(app) = APP.lock().take() else {
        return false;
    };

    tracing::info!("unihook detaching...");
    app.ctx.shutdown();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::tests::{FakeUnity, NullEngine};
    use unihook_core::features::Feature;

    #[test]
    fn test_app_registers_update_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let options = ContextOptions::new(dir.path())
            .with_engine(Arc::new(NullEngine::default()))
            .with_modules(Arc::new(FakeUnity));
        let app = App::new(options, CoreConfig::default()).unwrap();

        assert_eq!(app.ctx.features.names(), vec!["UpdateDispatch"]);
        let dispatch = app.ctx.features.get::<UpdateDispatch>().unwrap();
        assert!(dispatch.is_enabled());
        assert!(!dispatch.is_hooked());
        assert_eq!(app.config_dir, dir.path());
    }
}
