//! Closed-loop tracking correction.
//!
//! Turns a smoothed error average into at most one bounded actuation step
//! per cycle. Pure decision logic: no I/O, no memory beyond the inputs, so
//! it is testable in isolation and the caller owns actuation dispatch.

use serde::{Deserialize, Serialize};

/// Sign convention between error sign and actuator direction.
///
/// A per-deployment calibration constant — which way the motor must move to
/// reduce a positive error depends on the installation, so it is
/// configuration, never hard-coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    /// Step sign follows the error sign.
    #[default]
    Direct,
    /// Step sign opposes the error sign.
    Inverted,
}

impl Polarity {
    #[inline]
    pub const fn sign(self) -> f64 {
        match self {
            Self::Direct => 1.0,
            Self::Inverted => -1.0,
        }
    }
}

/// Deadband + fixed-step correction policy.
#[derive(Debug, Clone, Copy)]
pub struct TrackingController {
    /// No correction while `|average| <= deadband`.
    pub deadband: f64,
    /// Magnitude of every issued step.
    pub step_size: f64,
    /// Error-to-actuator sign convention.
    pub polarity: Polarity,
}

impl TrackingController {
    /// Decide the step for this cycle, if any.
    ///
    /// `None` when disabled, when the owning interlock is engaged, when the
    /// average sits inside the deadband (boundary inclusive), or when the
    /// average is not finite.
    pub fn decide(
        &self,
        correction_average: f64,
        enabled: bool,
        interlock_engaged: bool,
    ) -> Option<f64> {
        if !enabled || interlock_engaged {
            return None;
        }
        if !correction_average.is_finite() || correction_average.abs() <= self.deadband {
            return None;
        }
        Some(self.step_size * correction_average.signum() * self.polarity.sign())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> TrackingController {
        TrackingController {
            deadband: 0.1,
            step_size: 0.01,
            polarity: Polarity::Direct,
        }
    }

    #[test]
    fn no_step_when_disabled() {
        assert_eq!(controller().decide(5.0, false, false), None);
    }

    #[test]
    fn no_step_while_interlocked_regardless_of_magnitude() {
        assert_eq!(controller().decide(1000.0, true, true), None);
        assert_eq!(controller().decide(-1000.0, true, true), None);
    }

    #[test]
    fn deadband_boundary_is_inclusive_of_no_action() {
        let ctl = controller();
        assert_eq!(ctl.decide(0.1, true, false), None);
        assert_eq!(ctl.decide(-0.1, true, false), None);
        assert_eq!(ctl.decide(0.05, true, false), None);
    }

    #[test]
    fn step_has_exact_magnitude_and_error_sign() {
        let ctl = controller();
        assert_eq!(ctl.decide(0.2, true, false), Some(0.01));
        assert_eq!(ctl.decide(-0.2, true, false), Some(-0.01));
    }

    #[test]
    fn inverted_polarity_flips_direction() {
        let ctl = TrackingController {
            polarity: Polarity::Inverted,
            ..controller()
        };
        assert_eq!(ctl.decide(0.2, true, false), Some(-0.01));
        assert_eq!(ctl.decide(-0.2, true, false), Some(0.01));
    }

    #[test]
    fn non_finite_average_never_actuates() {
        let ctl = controller();
        assert_eq!(ctl.decide(f64::NAN, true, false), None);
        assert_eq!(ctl.decide(f64::INFINITY, true, false), None);
    }
}
