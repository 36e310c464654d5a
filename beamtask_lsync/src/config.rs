//! Task configuration.
//!
//! Loaded from a single TOML file through the shared [`ConfigLoader`] and
//! validated before the task starts. Validation failures are fatal — an
//! invalid loop period or buffer length never reaches the cycle loop.
//!
//! Signal bindings are plain strings; an empty binding disables the
//! corresponding feature (no acquisition, no actuation).

use beamtask_common::config::{ConfigError, SharedConfig};
use beamtask_common::signal::SignalValue;
use serde::Deserialize;

use crate::tracking::Polarity;

/// Top-level task configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "lsync-01"
///
/// [task]
/// loop_period = 0.2
/// avg_num = 10
/// interlock_buffer_length = 10
///
/// [interlock]
/// error_threshold = 1.0
/// amplitude_threshold = 0.0
///
/// [tracking]
/// deadband = 0.1
/// step_size = 0.01
/// polarity = "direct"
///
/// [signals]
/// prefix = "LSYNC"
/// pll_command = "RP:DIGITAL_P4_STATE_CMD"
/// pll_status = "RP:DIGITAL_P4_STATE_STATUS"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LsyncConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub task: TaskSection,
    #[serde(default)]
    pub interlock: InterlockSection,
    #[serde(default)]
    pub tracking: TrackingSection,
    #[serde(default)]
    pub signals: SignalBindings,
    #[serde(default)]
    pub motor: Option<MotorSection>,
    #[serde(default)]
    pub startup: Vec<StartupWrite>,
}

/// Cycle-loop parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSection {
    /// Nominal cycle period [s].
    #[serde(default = "default_loop_period")]
    pub loop_period: f64,
    /// Correction smoothing window length.
    #[serde(default = "default_avg_num")]
    pub avg_num: usize,
    /// Interlock window length `L`.
    #[serde(default = "default_interlock_buffer_length")]
    pub interlock_buffer_length: usize,
    /// Cycles after start during which actuation is suppressed.
    #[serde(default = "default_startup_grace_cycles")]
    pub startup_grace_cycles: u64,
}

fn default_loop_period() -> f64 {
    0.2
}
fn default_avg_num() -> usize {
    10
}
fn default_interlock_buffer_length() -> usize {
    10
}
fn default_startup_grace_cycles() -> u64 {
    10
}

impl Default for TaskSection {
    fn default() -> Self {
        Self {
            loop_period: default_loop_period(),
            avg_num: default_avg_num(),
            interlock_buffer_length: default_interlock_buffer_length(),
            startup_grace_cycles: default_startup_grace_cycles(),
        }
    }
}

/// Interlock thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct InterlockSection {
    /// Error samples strictly above this violate.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f64,
    /// Amplitude samples strictly below this violate.
    #[serde(default)]
    pub amplitude_threshold: f64,
}

fn default_error_threshold() -> f64 {
    1.0
}

impl Default for InterlockSection {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            amplitude_threshold: 0.0,
        }
    }
}

/// Tracking correction parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingSection {
    /// No correction while `|average| <= deadband`.
    #[serde(default = "default_deadband")]
    pub deadband: f64,
    /// Magnitude of each correction step.
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    /// Error-to-actuator sign convention.
    #[serde(default)]
    pub polarity: Polarity,
}

fn default_deadband() -> f64 {
    0.1
}
fn default_step_size() -> f64 {
    0.01
}

impl Default for TrackingSection {
    fn default() -> Self {
        Self {
            deadband: default_deadband(),
            step_size: default_step_size(),
            polarity: Polarity::Direct,
        }
    }
}

/// External signal name bindings. Empty string = feature disabled.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalBindings {
    /// Prefix for the task's own signals (ENABLE, STATUS, CYCLE, ...).
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Command output forcing the phase-lock on/off.
    #[serde(default)]
    pub pll_command: String,
    /// Readback of the phase-lock state.
    #[serde(default)]
    pub pll_status: String,
    /// Optional acquisition trigger pulsed before reading waveforms.
    #[serde(default)]
    pub acquisition_trigger: String,
    /// Correction waveform record.
    #[serde(default)]
    pub correction_wave: String,
    /// Error waveform record (reduced to its maximum).
    #[serde(default)]
    pub error_wave: String,
    /// Scalar laser amplitude readback.
    #[serde(default)]
    pub amplitude: String,
}

fn default_prefix() -> String {
    "LSYNC".to_string()
}

impl Default for SignalBindings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            pll_command: String::new(),
            pll_status: String::new(),
            acquisition_trigger: String::new(),
            correction_wave: String::new(),
            error_wave: String::new(),
            amplitude: String::new(),
        }
    }
}

/// Tracking motor binding, resolved once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct MotorSection {
    /// Device name, for logging and signal publication.
    pub name: String,
    /// Relative-move command signal.
    pub command: String,
    /// Position readback signal.
    #[serde(default)]
    pub readback: String,
    /// Moving-flag signal.
    #[serde(default)]
    pub moving: String,
    /// Optional travel limit written at startup.
    #[serde(default)]
    pub high_limit: Option<f64>,
    /// Signal the travel limit is written to.
    #[serde(default)]
    pub high_limit_signal: String,
}

/// One hardware setup write applied before the first cycle.
#[derive(Debug, Clone, Deserialize)]
pub struct StartupWrite {
    pub signal: String,
    pub value: StartupValue,
}

/// Value of a startup write, as it appears in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StartupValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl StartupValue {
    pub fn to_signal_value(&self) -> SignalValue {
        match self {
            Self::Bool(v) => SignalValue::Bool(*v),
            Self::Int(v) => SignalValue::Int(*v),
            Self::Float(v) => SignalValue::Float(*v),
            Self::Text(v) => SignalValue::Text(v.clone()),
        }
    }
}

impl LsyncConfig {
    /// Semantic validation. Any failure here is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if !(self.task.loop_period.is_finite() && self.task.loop_period > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "loop_period must be positive, got {}",
                self.task.loop_period
            )));
        }
        if self.task.avg_num == 0 {
            return Err(ConfigError::ValidationError(
                "avg_num must be positive".to_string(),
            ));
        }
        if self.task.interlock_buffer_length == 0 {
            return Err(ConfigError::ValidationError(
                "interlock_buffer_length must be positive".to_string(),
            ));
        }
        if !self.interlock.error_threshold.is_finite()
            || !self.interlock.amplitude_threshold.is_finite()
        {
            return Err(ConfigError::ValidationError(
                "interlock thresholds must be finite".to_string(),
            ));
        }
        if !(self.tracking.deadband.is_finite() && self.tracking.deadband >= 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "deadband must be non-negative, got {}",
                self.tracking.deadband
            )));
        }
        if !(self.tracking.step_size.is_finite() && self.tracking.step_size > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "step_size must be positive, got {}",
                self.tracking.step_size
            )));
        }
        if self.signals.prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "signals.prefix cannot be empty".to_string(),
            ));
        }
        if let Some(ref motor) = self.motor {
            if motor.name.is_empty() || motor.command.is_empty() {
                return Err(ConfigError::ValidationError(
                    "motor binding requires name and command".to_string(),
                ));
            }
            if motor.high_limit.is_some() && motor.high_limit_signal.is_empty() {
                return Err(ConfigError::ValidationError(
                    "motor.high_limit requires motor.high_limit_signal".to_string(),
                ));
            }
        }
        for write in &self.startup {
            if write.signal.is_empty() {
                return Err(ConfigError::ValidationError(
                    "startup write with empty signal name".to_string(),
                ));
            }
        }
        Ok(())
    }
}
