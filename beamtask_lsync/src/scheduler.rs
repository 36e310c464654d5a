//! Fixed-period cycle scheduler.
//!
//! Drives [`ControlCycle`] at the configured nominal period for the task's
//! lifetime. The loop is deliberately drift-tolerant: each tick sleeps
//! `period − elapsed`, and when cycle work overruns the period the next tick
//! starts immediately instead of being skipped. A disabled task still sleeps
//! a full period per tick — an idle, not an error.
//!
//! Stop is cooperative: the flag is observed at the top of the next tick,
//! any in-flight cycle finishes, and the cleanup path (safe-state forcing,
//! END status) runs on every exit.

use beamtask_common::task::{TaskShell, TaskStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::cycle::ControlCycle;

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not running (initial, and again after cleanup).
    Stopped,
    /// Ticking.
    Running,
    /// Stop observed; finishing the in-flight cycle and cleaning up.
    Stopping,
}

/// Drives the control cycle at a fixed nominal period.
pub struct CycleScheduler {
    period: Duration,
    stop: Arc<AtomicBool>,
    state: SchedulerState,
}

impl CycleScheduler {
    pub fn new(loop_period: f64, stop: Arc<AtomicBool>) -> Self {
        Self {
            period: Duration::from_secs_f64(loop_period),
            stop,
            state: SchedulerState::Stopped,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Run until an external stop request. Cleanup always executes before
    /// this returns, even when the last cycle ended in error.
    pub fn run(&mut self, shell: &mut TaskShell, cycle: &mut ControlCycle) {
        self.state = SchedulerState::Running;
        info!("cycle loop started (period {:?})", self.period);

        loop {
            if self.stop.load(Ordering::SeqCst) {
                self.state = SchedulerState::Stopping;
                break;
            }

            let tick_start = Instant::now();

            if !shell.is_enabled() {
                debug!("task disabled, skipping cycle");
                std::thread::sleep(self.period);
                continue;
            }

            match cycle.run_once(shell) {
                Ok(()) => {
                    shell.step_cycle();
                    shell.set_status(TaskStatus::Running);
                }
                Err(e) => {
                    error!("error in processing cycle: {e}");
                    shell.set_status(TaskStatus::Error);
                    shell.set_message(&format!("Error: {e}"));
                }
            }

            // Relative sleep; an overrun starts the next tick immediately.
            if let Some(remaining) = self.period.checked_sub(tick_start.elapsed()) {
                std::thread::sleep(remaining);
            }
        }

        info!("stop requested, cleaning up");
        cycle.force_safe_state();
        shell.set_status(TaskStatus::End);
        shell.set_message("Stopped");
        self.state = SchedulerState::Stopped;
        info!("cycle loop stopped after {} cycles", shell.cycle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_stopped() {
        let scheduler = CycleScheduler::new(0.2, Arc::new(AtomicBool::new(false)));
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[test]
    fn pre_set_stop_flag_short_circuits_to_cleanup() {
        use beamtask_common::signal::{MemoryRegistry, SignalLink, SignalValue};
        use crate::config::LsyncConfig;
        use crate::cycle::ControlCycle;

        let config: LsyncConfig = toml::from_str(
            r#"
[shared]
service_name = "lsync-test"

[signals]
pll_command = "RP:PLL_CMD"
"#,
        )
        .unwrap();

        let registry = Arc::new(MemoryRegistry::new());
        registry.seed("RP:PLL_CMD", SignalValue::Int(1));
        let mut shell = TaskShell::new(registry.clone(), "LSYNC", 0);
        let mut cycle = ControlCycle::new(&config, registry.clone(), None);

        let stop = Arc::new(AtomicBool::new(true));
        let mut scheduler = CycleScheduler::new(0.001, stop);
        scheduler.run(&mut shell, &mut cycle);

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(shell.cycle(), 0);
        // Cleanup forced the protected output off and published END.
        assert_eq!(
            registry.read("RP:PLL_CMD").unwrap(),
            Some(SignalValue::Int(0))
        );
        assert_eq!(
            registry.read("LSYNC:STATUS").unwrap(),
            Some(SignalValue::Text("END".into()))
        );
        assert_eq!(
            registry.read("LSYNC:MSG").unwrap(),
            Some(SignalValue::Text("Stopped".into()))
        );
    }
}
