//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the receiver crates:
//! - Logging and tracing initialisation
//! - Log-field helpers for packet payloads
//!
//! ## Overview
//!
//! Library crates in this workspace only emit `tracing` events. Binaries and
//! test harnesses call [`logging::init_logging`] once to render them.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
