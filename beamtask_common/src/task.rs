//! Task lifecycle surface.
//!
//! [`TaskShell`] is the narrow slice of the host framework a task core sees:
//! the enable gate, status/message publication, and the monotonic cycle
//! counter. All of it rides on the task's own signals under a configured
//! prefix (`{prefix}:ENABLE`, `{prefix}:STATUS`, `{prefix}:MSG`,
//! `{prefix}:CYCLE`).

use crate::signal::{SignalLink, SignalValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Recognized task status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Task is enabled and cycling.
    Running,
    /// The most recent cycle failed; the loop continues.
    Error,
    /// Task stopped and cleanup completed.
    End,
}

impl TaskStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Error => "ERROR",
            Self::End => "END",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-task lifecycle state: enable gate, observability outputs, cycle
/// counter, startup grace period.
///
/// The counter advances exactly once per successful enabled cycle — the
/// scheduler calls [`step_cycle`](Self::step_cycle) only after the cycle body
/// returns `Ok`. It never moves backwards except through
/// [`reset_cycle`](Self::reset_cycle).
pub struct TaskShell {
    link: Arc<dyn SignalLink>,
    prefix: String,
    cycle: u64,
    grace_cycles: u64,
    last_status: Option<TaskStatus>,
}

impl TaskShell {
    pub fn new(link: Arc<dyn SignalLink>, prefix: impl Into<String>, grace_cycles: u64) -> Self {
        Self {
            link,
            prefix: prefix.into(),
            cycle: 0,
            grace_cycles,
            last_status: None,
        }
    }

    /// Fully qualified name of one of the task's own signals.
    pub fn signal(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    /// Task-level gate, checked once per cycle. Absence reads as disabled.
    pub fn is_enabled(&self) -> bool {
        match self.link.read(&self.signal("ENABLE")) {
            Ok(value) => value.and_then(|v| v.as_bool()).unwrap_or(false),
            Err(e) => {
                debug!("enable flag unavailable: {e}");
                false
            }
        }
    }

    /// Publish the task status. Transitions are logged once, not per cycle.
    pub fn set_status(&mut self, status: TaskStatus) {
        if self.last_status != Some(status) {
            info!("task status -> {status}");
            self.last_status = Some(status);
        }
        if let Err(e) = self
            .link
            .write(&self.signal("STATUS"), SignalValue::Text(status.as_str().into()))
        {
            debug!("status publication failed: {e}");
        }
    }

    /// Publish a human-readable message.
    pub fn set_message(&self, message: &str) {
        if let Err(e) = self
            .link
            .write(&self.signal("MSG"), SignalValue::Text(message.to_string()))
        {
            debug!("message publication failed: {e}");
        }
    }

    /// Cycles completed so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Advance and publish the cycle counter.
    pub fn step_cycle(&mut self) {
        self.cycle += 1;
        if let Err(e) = self
            .link
            .write(&self.signal("CYCLE"), SignalValue::Int(self.cycle as i64))
        {
            debug!("cycle publication failed: {e}");
        }
    }

    /// Explicitly reset the cycle counter (and re-enter the grace period).
    pub fn reset_cycle(&mut self) {
        self.cycle = 0;
        if let Err(e) = self.link.write(&self.signal("CYCLE"), SignalValue::Int(0)) {
            debug!("cycle publication failed: {e}");
        }
    }

    /// True while actuation is still suppressed after start.
    pub fn in_startup_grace(&self) -> bool {
        self.cycle < self.grace_cycles
    }

    /// Handle to the underlying signal link.
    pub fn link(&self) -> Arc<dyn SignalLink> {
        self.link.clone()
    }
}
