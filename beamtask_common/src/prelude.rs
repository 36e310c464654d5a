//! Prelude module for common re-exports.
//!
//! `use beamtask_common::prelude::*;` pulls in the types almost every task
//! needs without listing individual paths.

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};

// ─── Signals ────────────────────────────────────────────────────────
pub use crate::signal::{MemoryRegistry, SignalError, SignalLink, SignalValue};

// ─── Devices ────────────────────────────────────────────────────────
pub use crate::device::{Device, DeviceError, SignalDevice};

// ─── Task lifecycle ─────────────────────────────────────────────────
pub use crate::task::{TaskShell, TaskStatus};
