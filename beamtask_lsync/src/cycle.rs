//! One supervisory iteration: acquire → interlock → tracking → publish.
//!
//! [`ControlCycle`] owns every piece of mutable task state — the sample
//! buffers, the interlock latch, the motor binding — and mutates it only
//! from [`run_once`](ControlCycle::run_once). The scheduler calls that once
//! per tick and treats its `Err` as "catch, report, continue": status goes
//! to ERROR, the cycle counter stays put, and the next tick runs normally.
//!
//! Per-signal absence (`Ok(None)`) is not an error — the affected sample is
//! simply skipped that cycle. Only a transport-level read failure aborts the
//! iteration.

use beamtask_common::device::Device;
use beamtask_common::signal::{SignalError, SignalLink, SignalValue};
use beamtask_common::task::TaskShell;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::buffer::{EmptyBufferError, SampleBuffer};
use crate::config::{LsyncConfig, SignalBindings};
use crate::interlock::{InterlockEngine, InterlockSettings};
use crate::tracking::TrackingController;

/// Failure that aborts one iteration at the cycle boundary.
#[derive(Debug, Clone, Error)]
pub enum CycleError {
    /// A signal read failed at the transport level.
    #[error("acquisition failed: {0}")]
    Acquisition(#[from] SignalError),
    /// A statistic was requested on an empty buffer.
    #[error("computation failed: {0}")]
    Computation(#[from] EmptyBufferError),
}

/// Owner and executor of the per-cycle supervisory logic.
pub struct ControlCycle {
    link: Arc<dyn SignalLink>,
    signals: SignalBindings,
    interlock: InterlockEngine,
    corr_buffer: SampleBuffer,
    tracking: TrackingController,
    motor: Option<Box<dyn Device>>,
    prev_subsystem_active: bool,
    prev_motor_moving: bool,
}

impl ControlCycle {
    pub fn new(
        config: &LsyncConfig,
        link: Arc<dyn SignalLink>,
        motor: Option<Box<dyn Device>>,
    ) -> Self {
        Self {
            link,
            signals: config.signals.clone(),
            interlock: InterlockEngine::new(InterlockSettings {
                buffer_length: config.task.interlock_buffer_length,
                error_threshold: config.interlock.error_threshold,
                amplitude_threshold: config.interlock.amplitude_threshold,
            }),
            corr_buffer: SampleBuffer::new(config.task.avg_num),
            tracking: TrackingController {
                deadband: config.tracking.deadband,
                step_size: config.tracking.step_size,
                polarity: config.tracking.polarity,
            },
            motor,
            prev_subsystem_active: false,
            prev_motor_moving: false,
        }
    }

    /// Apply the configured hardware setup writes (acquisition source,
    /// output enables, motor travel limit). Failures are logged and
    /// non-fatal — the hardware may be absent in simulation.
    pub fn initialize(&self, config: &LsyncConfig) {
        for write in &config.startup {
            if let Err(e) = self.link.write(&write.signal, write.value.to_signal_value()) {
                warn!("startup write to '{}' failed: {e}", write.signal);
            }
        }
        if let Some(ref motor) = config.motor {
            if let (Some(limit), false) = (motor.high_limit, motor.high_limit_signal.is_empty()) {
                if let Err(e) = self
                    .link
                    .write(&motor.high_limit_signal, SignalValue::Float(limit))
                {
                    warn!("motor limit write to '{}' failed: {e}", motor.high_limit_signal);
                }
            }
        }
        info!("startup initialization complete ({} writes)", config.startup.len());
    }

    /// Execute exactly one supervisory iteration.
    pub fn run_once(&mut self, shell: &mut TaskShell) -> Result<(), CycleError> {
        // ── Subsystem state ──
        let mut pll_on = self
            .read_bound(&self.signals.pll_status)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        self.publish(&shell.signal("PLL_ON"), SignalValue::Int(i64::from(pll_on)));

        // ── Operator commands ──
        if self.take_command(&shell.signal("AVG_RESET"))? {
            self.corr_buffer.reset();
            info!("correction average buffer reset");
        }
        if self.take_command(&shell.signal("ILK_RESET"))? {
            self.interlock.reset();
            info!("interlock latch cleared by operator");
        }
        // A rising edge of the subsystem state is the external re-enable
        // that clears the latch.
        if pll_on && !self.prev_subsystem_active && self.interlock.is_engaged() {
            info!("subsystem re-enabled externally, clearing interlock latch");
            self.interlock.reset();
        }
        self.prev_subsystem_active = pll_on;

        // ── Correction acquisition ──
        if !self.signals.correction_wave.is_empty() {
            if !self.signals.acquisition_trigger.is_empty() {
                self.publish(&self.signals.acquisition_trigger, SignalValue::Int(1));
            }
            let wave = self
                .read_bound(&self.signals.correction_wave)?
                .and_then(|v| match v {
                    SignalValue::Waveform(w) => Some(w),
                    _ => None,
                });
            if let Some(wave) = wave {
                let start = self
                    .read_bound(&shell.signal("AVG_START"))?
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                let stop = self
                    .read_bound(&shell.signal("AVG_STOP"))?
                    .and_then(|v| v.as_i64());
                if let Some(corr) = window_mean(&wave, start, stop) {
                    self.publish(&shell.signal("CORR"), SignalValue::Float(corr));
                    self.corr_buffer.push(corr);
                    let average = self.corr_buffer.mean()?;
                    self.publish(&shell.signal("CORR_AVG"), SignalValue::Float(average));
                }
            }
        }

        // ── Interlock samples ──
        let error_sample = match self.read_bound(&self.signals.error_wave)? {
            Some(SignalValue::Waveform(w)) => {
                w.iter()
                    .copied()
                    .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            }
            Some(other) => other.as_f64(),
            None => None,
        };
        let amplitude_sample = self
            .read_bound(&self.signals.amplitude)?
            .and_then(|v| v.as_f64());

        // ── Interlock evaluation ──
        let verdict = self
            .interlock
            .evaluate(pll_on, error_sample, amplitude_sample);
        if verdict.force_off {
            warn!("interlock tripped ({}), forcing subsystem off", verdict.reason);
            self.command_subsystem_off();
            pll_on = false;
        }
        self.publish(
            &shell.signal("ILK_ENGAGED"),
            SignalValue::Int(i64::from(verdict.engaged)),
        );
        self.publish(
            &shell.signal("ILK_REASON"),
            SignalValue::Text(verdict.reason.as_str().to_string()),
        );

        // ── Tracking gate ──
        let tracking_signal = shell.signal("TRACKING_ON");
        let mut tracking_on = self
            .read_bound(&tracking_signal)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !pll_on && tracking_on {
            // Tracking cannot run against an unlocked loop.
            self.publish(&tracking_signal, SignalValue::Int(0));
            tracking_on = false;
        }

        // ── Tracking correction ──
        // An empty correction buffer yields no decision at all.
        if let Ok(average) = self.corr_buffer.mean() {
            if let Some(step) = self.tracking.decide(average, tracking_on, verdict.engaged) {
                if shell.in_startup_grace() {
                    debug!("startup grace active, suppressing tracking step {step}");
                } else if let Some(motor) = self.motor.as_mut() {
                    match motor.set(step) {
                        Ok(()) => debug!("tracking: moving '{}' by {step}", motor.name()),
                        Err(e) => error!("tracking actuation failed on '{}': {e}", motor.name()),
                    }
                }
            }
        }

        // ── Motor observation ──
        if let Some(motor) = self.motor.as_ref() {
            let moving = motor.is_moving();
            let position = motor.position();
            self.publish(&shell.signal("MOTOR_POS"), SignalValue::Float(position));
            self.publish(
                &shell.signal("MOTOR_MOVING"),
                SignalValue::Int(i64::from(moving)),
            );
            if moving && !self.prev_motor_moving {
                info!("motor '{}' started moving at position {position}", motor.name());
            } else if !moving && self.prev_motor_moving {
                info!("motor '{}' stopped at position {position}", motor.name());
            }
            self.prev_motor_moving = moving;
        }

        // ── Status message ──
        let mut message = format!(
            "PLL:{} Track:{}",
            if pll_on { "ON" } else { "OFF" },
            if tracking_on { "ON" } else { "OFF" },
        );
        if verdict.engaged {
            message.push_str(" ILK:");
            message.push_str(verdict.reason.as_str());
        }
        shell.set_message(&message);

        Ok(())
    }

    /// Force protected outputs to their safe state. Runs during cleanup on
    /// every exit path, and whenever the interlock trips.
    pub fn force_safe_state(&self) {
        info!("forcing protected outputs to safe state");
        self.command_subsystem_off();
    }

    pub fn interlock(&self) -> &InterlockEngine {
        &self.interlock
    }

    pub fn correction_buffer(&self) -> &SampleBuffer {
        &self.corr_buffer
    }

    fn command_subsystem_off(&self) {
        if self.signals.pll_command.is_empty() {
            return;
        }
        if let Err(e) = self.link.write(&self.signals.pll_command, SignalValue::Int(0)) {
            error!("failed to force subsystem off: {e}");
        }
    }

    /// Read a bound signal; an empty binding or an absent value is `None`.
    fn read_bound(&self, name: &str) -> Result<Option<SignalValue>, CycleError> {
        if name.is_empty() {
            return Ok(None);
        }
        Ok(self.link.read(name)?)
    }

    /// Read a momentary command signal and acknowledge it by writing 0 back.
    fn take_command(&self, name: &str) -> Result<bool, CycleError> {
        let requested = self
            .link
            .read(name)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if requested {
            self.publish(name, SignalValue::Int(0));
        }
        Ok(requested)
    }

    /// Best-effort write; failures are logged, never fatal.
    fn publish(&self, name: &str, value: SignalValue) {
        if let Err(e) = self.link.write(name, value) {
            debug!("publication of '{name}' failed: {e}");
        }
    }
}

/// Mean of the inclusive index window `[start, stop]` of a waveform.
///
/// Indices are clamped to the record; `stop = None` means "to the end".
/// An empty record yields no value.
fn window_mean(wave: &[f64], start: i64, stop: Option<i64>) -> Option<f64> {
    if wave.is_empty() {
        return None;
    }
    let last = (wave.len() - 1) as i64;
    let start = start.clamp(0, last);
    let stop = stop.unwrap_or(last).clamp(start, last);
    let window = &wave[start as usize..=stop as usize];
    Some(window.iter().sum::<f64>() / window.len() as f64)
}
