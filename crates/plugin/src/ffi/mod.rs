//! C ABI surface called by the injector

pub mod exports;
