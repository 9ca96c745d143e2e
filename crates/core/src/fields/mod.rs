//! Reactive config fields
//!
//! A [`Field`] is a typed value bound to one key of a feature's node in the
//! [`ConfigStore`](crate::config::ConfigStore). Setting it persists through a
//! debounced save and fires a change event; the [`FieldRegistry`] reloads
//! every live field whenever the store switches profile or resets.
//!
//! # Example
//!
//! ```ignore
//! let fov = Field::new(&ctx.fields, "Player.Fov", "value", 90.0f64);
//! fov.set_validator(|v| (30.0..=170.0).contains(v));
//!
//! let _sub = fov.on_changed(|change| {
//!     tracing::info!("Fov {} -> {}", change.old, change.new);
//! });
//!
//! fov.set(110.0);
//! fov.modify(|v| *v += 5.0);
//! ```

mod field;
mod object;
mod registry;

pub use field::{Field, FieldGuard, FieldValue};
pub use object::ConfigObject;
pub use registry::{ErasedField, FieldId, FieldRegistry};
