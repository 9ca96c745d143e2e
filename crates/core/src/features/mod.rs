//! Feature framework
//!
//! A feature is a toggleable unit of behaviour with its own config node
//! (`features.<Section>.<Name>`), an `enabled` flag and a toggle hotkey.
//! The [`FeatureManager`] owns every feature, wires the flag and hotkey to
//! `on_enable` / `on_disable`, and dispatches `init`, `update`, `draw` and
//! config reloads with per-feature fault isolation.
//!
//! # Example
//!
//! ```ignore
//! use unihook_core::features::{Feature, FeatureSection, FeatureState};
//!
//! struct NoRecoil {
//!     state: FeatureState,
//! }
//!
//! impl Feature for NoRecoil {
//!     fn state(&self) -> &FeatureState {
//!         &self.state
//!     }
//!
//!     fn on_enable(&self) {
//!         tracing::info!("Recoil disabled");
//!     }
//! }
//!
//! let state = FeatureState::new(&ctx.fields, &ctx.hotkeys, "NoRecoil", "", FeatureSection::Combat);
//! ctx.features.register(Arc::new(NoRecoil { state }));
//! ctx.features.init();
//! ```

mod feature;
mod manager;
mod ui;

pub use feature::{Feature, FeatureSection, FeatureState};
pub use manager::FeatureManager;
pub use ui::{Click, Ui};
