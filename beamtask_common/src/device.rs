//! Device capability boundary.
//!
//! Addressable hardware (motors, switches) is exposed to tasks through the
//! [`Device`] trait: a moving flag, a position readback, and a single `set`
//! command. Bindings are resolved once when the device is constructed — the
//! cycle loop never re-probes what a device can do.

use crate::signal::{SignalError, SignalLink, SignalValue};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Error type for device actuation.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The underlying signal write failed.
    #[error(transparent)]
    Signal(#[from] SignalError),
}

/// Capability contract for addressable hardware.
///
/// `is_moving` and `position` are best-effort reads: an unreachable readback
/// reports not-moving / 0.0 rather than failing the caller's cycle. Only
/// `set` — the one operation with a physical side effect — returns a result.
pub trait Device: Send {
    /// Configured device name, for logging and signal publication.
    fn name(&self) -> &str;

    /// True while the device reports motion in progress.
    fn is_moving(&self) -> bool;

    /// Current position readback in user units.
    fn position(&self) -> f64;

    /// Issue a command value to the device (for a motor: a relative move).
    fn set(&mut self, value: f64) -> Result<(), DeviceError>;
}

/// A [`Device`] backed by named signals.
///
/// Command, readback, and moving-flag signal names are fixed at
/// construction. The moving binding is optional: a device without one
/// simply always reports not-moving.
pub struct SignalDevice {
    name: String,
    link: Arc<dyn SignalLink>,
    command: String,
    readback: String,
    moving: Option<String>,
}

impl SignalDevice {
    pub fn new(
        name: impl Into<String>,
        link: Arc<dyn SignalLink>,
        command: impl Into<String>,
        readback: impl Into<String>,
        moving: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            link,
            command: command.into(),
            readback: readback.into(),
            moving,
        }
    }
}

impl Device for SignalDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_moving(&self) -> bool {
        let Some(ref moving) = self.moving else {
            return false;
        };
        match self.link.read(moving) {
            Ok(value) => value.and_then(|v| v.as_bool()).unwrap_or(false),
            Err(e) => {
                debug!("moving readback unavailable for '{}': {e}", self.name);
                false
            }
        }
    }

    fn position(&self) -> f64 {
        match self.link.read(&self.readback) {
            Ok(value) => value.and_then(|v| v.as_f64()).unwrap_or(0.0),
            Err(e) => {
                debug!("position readback unavailable for '{}': {e}", self.name);
                0.0
            }
        }
    }

    fn set(&mut self, value: f64) -> Result<(), DeviceError> {
        self.link.write(&self.command, SignalValue::Float(value))?;
        Ok(())
    }
}
