//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-receiver`, `core-runtime`). Host applications can
//! depend on `rtc-audio-workspace` and enable the documented features without
//! needing to wire each crate individually.

pub use core_receiver as receiver;

#[cfg(feature = "logging")]
pub use core_runtime as runtime;
