//! Latching safety interlock over sliding sample windows.
//!
//! Two independent accumulating conditions protect the phase-lock: a
//! sustained error excursion (every sample in a full window over threshold)
//! and a sustained amplitude loss (every sample in a full window under
//! threshold). Requiring the *whole* window to violate rejects single-sample
//! transients while still tripping within `L` cycles of a sustained fault —
//! the `== L` comparison carries that bounded-time guarantee.
//!
//! Engagement is a latch, not a level: once engaged it stays engaged until
//! an explicit [`reset`](InterlockEngine::reset), regardless of how the
//! buffers evolve afterwards.

use crate::buffer::SampleBuffer;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Conditions found violated in a single evaluation.
    ///
    /// Both can hold at once; [`TripReason`] resolves the reported cause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TripCondition: u8 {
        /// Every sample in the full error window exceeded its threshold.
        const ERROR_SUSTAINED = 0x01;
        /// Every sample in the full amplitude window fell under its threshold.
        const AMPLITUDE_LOST  = 0x02;
    }
}

/// Cause recorded when the latch engages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TripReason {
    /// Not engaged.
    #[default]
    None,
    /// Sustained error excursion.
    ErrorThreshold,
    /// Sustained amplitude loss.
    AmplitudeThreshold,
}

impl TripReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ErrorThreshold => "error_threshold",
            Self::AmplitudeThreshold => "amplitude_threshold",
        }
    }
}

impl fmt::Display for TripReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds and window length for one engine instance.
#[derive(Debug, Clone, Copy)]
pub struct InterlockSettings {
    /// Window length `L` for both buffers.
    pub buffer_length: usize,
    /// Error samples strictly above this violate.
    pub error_threshold: f64,
    /// Amplitude samples strictly below this violate.
    pub amplitude_threshold: f64,
}

/// Outcome of one per-cycle evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterlockVerdict {
    /// Effective engagement reported this cycle (always false while the
    /// subsystem is inactive — there is nothing to protect).
    pub engaged: bool,
    /// Reported cause.
    pub reason: TripReason,
    /// True exactly when this evaluation found a violated condition; the
    /// caller must force the subsystem off.
    pub force_off: bool,
    /// Raw condition set behind `reason`, for diagnostics.
    pub tripped: TripCondition,
}

impl InterlockVerdict {
    const fn idle() -> Self {
        Self {
            engaged: false,
            reason: TripReason::None,
            force_off: false,
            tripped: TripCondition::empty(),
        }
    }
}

/// Per-cycle interlock decision engine.
pub struct InterlockEngine {
    error_buffer: SampleBuffer,
    amplitude_buffer: SampleBuffer,
    error_threshold: f64,
    amplitude_threshold: f64,
    engaged: bool,
    reason: TripReason,
}

impl InterlockEngine {
    pub fn new(settings: InterlockSettings) -> Self {
        Self {
            error_buffer: SampleBuffer::new(settings.buffer_length),
            amplitude_buffer: SampleBuffer::new(settings.buffer_length),
            error_threshold: settings.error_threshold,
            amplitude_threshold: settings.amplitude_threshold,
            engaged: false,
            reason: TripReason::None,
        }
    }

    /// Run one cycle of the engine.
    ///
    /// Present samples are recorded first, whether or not the subsystem is
    /// active; an absent sample contributes nothing (never a substituted
    /// sentinel, which would bias the violation count). With the subsystem
    /// inactive the verdict reports disengaged and the latch is untouched —
    /// the engine neither protects nor self-arms on an idle subsystem.
    pub fn evaluate(
        &mut self,
        subsystem_active: bool,
        error_sample: Option<f64>,
        amplitude_sample: Option<f64>,
    ) -> InterlockVerdict {
        if let Some(sample) = error_sample {
            self.error_buffer.push(sample);
        }
        if let Some(sample) = amplitude_sample {
            self.amplitude_buffer.push(sample);
        }

        if !subsystem_active {
            return InterlockVerdict::idle();
        }

        let length = self.error_buffer.capacity();
        let mut tripped = TripCondition::empty();
        if self.error_buffer.is_full()
            && self.error_buffer.count_over(self.error_threshold) == length
        {
            tripped |= TripCondition::ERROR_SUSTAINED;
        }
        if self.amplitude_buffer.is_full()
            && self.amplitude_buffer.count_under(self.amplitude_threshold) == length
        {
            tripped |= TripCondition::AMPLITUDE_LOST;
        }

        let force_off = !tripped.is_empty();
        if force_off {
            self.engaged = true;
            // Error excursion takes precedence when both conditions hold.
            self.reason = if tripped.contains(TripCondition::ERROR_SUSTAINED) {
                TripReason::ErrorThreshold
            } else {
                TripReason::AmplitudeThreshold
            };
        }

        InterlockVerdict {
            engaged: self.engaged,
            reason: self.reason,
            force_off,
            tripped,
        }
    }

    /// Clear the latch and both windows.
    ///
    /// This is the only way out of engagement; it models the external
    /// re-enable command.
    pub fn reset(&mut self) {
        self.engaged = false;
        self.reason = TripReason::None;
        self.error_buffer.reset();
        self.amplitude_buffer.reset();
    }

    #[inline]
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    #[inline]
    pub fn reason(&self) -> TripReason {
        self.reason
    }

    pub fn error_buffer(&self) -> &SampleBuffer {
        &self.error_buffer
    }

    pub fn amplitude_buffer(&self) -> &SampleBuffer {
        &self.amplitude_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(length: usize) -> InterlockEngine {
        InterlockEngine::new(InterlockSettings {
            buffer_length: length,
            error_threshold: 1.0,
            amplitude_threshold: 0.5,
        })
    }

    #[test]
    fn engages_only_when_every_sample_violates() {
        let mut ilk = engine(5);
        for _ in 0..5 {
            let v = ilk.evaluate(true, Some(1.1), None);
            // Amplitude buffer stays empty; only the error path can trip.
            assert_eq!(v.tripped & TripCondition::AMPLITUDE_LOST, TripCondition::empty());
        }
        assert!(ilk.is_engaged());
        assert_eq!(ilk.reason(), TripReason::ErrorThreshold);
    }

    #[test]
    fn single_compliant_sample_prevents_engagement() {
        let mut ilk = engine(5);
        for sample in [1.1, 1.1, 0.9, 1.1, 1.1] {
            let v = ilk.evaluate(true, Some(sample), None);
            assert!(!v.engaged);
            assert!(!v.force_off);
        }
        assert!(!ilk.is_engaged());
    }

    #[test]
    fn partial_buffer_never_engages() {
        let mut ilk = engine(5);
        for _ in 0..4 {
            let v = ilk.evaluate(true, Some(10.0), None);
            assert!(!v.force_off);
        }
        assert!(!ilk.is_engaged());
    }

    #[test]
    fn latch_survives_compliant_samples_until_reset() {
        let mut ilk = engine(3);
        for _ in 0..3 {
            ilk.evaluate(true, Some(2.0), None);
        }
        assert!(ilk.is_engaged());

        for _ in 0..10 {
            let v = ilk.evaluate(true, Some(0.0), None);
            assert!(v.engaged);
            assert_eq!(v.reason, TripReason::ErrorThreshold);
            assert!(!v.force_off);
        }

        ilk.reset();
        assert!(!ilk.is_engaged());
        assert_eq!(ilk.reason(), TripReason::None);
        // Buffers were cleared with the latch.
        assert!(ilk.error_buffer().is_empty());
    }

    #[test]
    fn inactive_subsystem_reports_disengaged_without_clearing_latch() {
        let mut ilk = engine(2);
        for _ in 0..2 {
            ilk.evaluate(true, Some(5.0), None);
        }
        assert!(ilk.is_engaged());

        let v = ilk.evaluate(false, Some(5.0), None);
        assert!(!v.engaged);
        assert_eq!(v.reason, TripReason::None);
        assert!(!v.force_off);
        // Internal latch persists until an explicit reset.
        assert!(ilk.is_engaged());
    }

    #[test]
    fn idle_subsystem_accumulates_but_never_arms() {
        let mut ilk = engine(2);
        for _ in 0..5 {
            let v = ilk.evaluate(false, Some(5.0), None);
            assert!(!v.engaged);
        }
        assert!(!ilk.is_engaged());
        assert!(ilk.error_buffer().is_full());

        // Activation with the buffer already violated trips immediately.
        let v = ilk.evaluate(true, Some(5.0), None);
        assert!(v.force_off);
        assert!(v.engaged);
    }

    #[test]
    fn absent_samples_do_not_grow_buffers() {
        let mut ilk = engine(3);
        ilk.evaluate(true, Some(2.0), None);
        ilk.evaluate(true, None, None);
        ilk.evaluate(true, None, None);
        assert_eq!(ilk.error_buffer().len(), 1);
        assert!(!ilk.is_engaged());
    }

    #[test]
    fn amplitude_loss_engages_with_its_own_reason() {
        let mut ilk = engine(3);
        for _ in 0..3 {
            ilk.evaluate(true, None, Some(0.1));
        }
        assert!(ilk.is_engaged());
        assert_eq!(ilk.reason(), TripReason::AmplitudeThreshold);
    }

    #[test]
    fn error_reason_takes_precedence_when_both_trip() {
        let mut ilk = engine(2);
        for _ in 0..2 {
            ilk.evaluate(true, Some(5.0), Some(0.0));
        }
        let v = ilk.evaluate(true, Some(5.0), Some(0.0));
        assert!(v.tripped.contains(TripCondition::ERROR_SUSTAINED));
        assert!(v.tripped.contains(TripCondition::AMPLITUDE_LOST));
        assert_eq!(v.reason, TripReason::ErrorThreshold);
    }

    #[test]
    fn end_to_end_window_scenario() {
        // Window length 3, error threshold 2.0.
        let mut ilk = InterlockEngine::new(InterlockSettings {
            buffer_length: 3,
            error_threshold: 2.0,
            amplitude_threshold: 0.0,
        });

        // 2.5, 2.1, 0.5 → full but 0.5 complies.
        for sample in [2.5, 2.1, 0.5] {
            let v = ilk.evaluate(true, Some(sample), None);
            assert!(!v.engaged);
        }
        assert!(ilk.error_buffer().is_full());

        // 3.0 evicts 2.5 → [2.1, 0.5, 3.0], still compliant.
        let v = ilk.evaluate(true, Some(3.0), None);
        assert!(!v.engaged);

        // 2.1 → [0.5, 3.0, 2.1], the 0.5 still blocks engagement.
        let v = ilk.evaluate(true, Some(2.1), None);
        assert!(!v.engaged);

        // 3.0 evicts the 0.5 → [3.0, 2.1, 3.0], all > 2.0 → engaged.
        let v = ilk.evaluate(true, Some(3.0), None);
        assert!(v.engaged);
        assert!(v.force_off);
        assert_eq!(v.reason, TripReason::ErrorThreshold);
    }
}
