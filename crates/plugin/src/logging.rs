//! tracing-subscriber setup

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use unihook_core::CoreConfig;

/// Environment variable overriding the configured filter
pub const LOG_ENV: &str = "UNIHOOK_LOG";

/// Filter directive: `$UNIHOOK_LOG`, else the core config's level
fn directive(env: Option<String>, config: &CoreConfig) -> String {
    env.filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.log_filter().to_string())
}

fn open_log(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("unihook: cannot open log file {:?}: {}", path, e);
            None
        }
    }
}

/// Install the global subscriber
///
/// Returns false if a subscriber was already installed (second attach).
pub fn init(config: &CoreConfig, config_dir: &Path) -> bool {
    let directive = directive(std::env::var(LOG_ENV).ok(), config);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("unihook: invalid log filter '{}': {}", directive, e);
        EnvFilter::new("info")
    });

    let file_layer = config
        .log_file(config_dir)
        .and_then(|path| open_log(&path))
        .map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file))
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .is_ok()
}
