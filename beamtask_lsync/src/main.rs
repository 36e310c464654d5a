//! # Beamtask Laser Synchronization Task
//!
//! Supervisory control loop for laser-to-RF synchronization: acquires error
//! and amplitude signals, maintains a latching safety interlock over the
//! phase-lock enable, and issues bounded tracking corrections to a motor.
//!
//! The binary wires the task core to an in-process signal registry. A real
//! deployment replaces that registry with a bridge to the facility's PV
//! transport behind the same `SignalLink` trait.

use beamtask_common::config::ConfigLoader;
use beamtask_common::device::{Device, SignalDevice};
use beamtask_common::signal::{MemoryRegistry, SignalLink, SignalValue};
use beamtask_common::task::TaskShell;
use beamtask_lsync::config::LsyncConfig;
use beamtask_lsync::cycle::ControlCycle;
use beamtask_lsync::scheduler::CycleScheduler;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, Level};
use tracing_subscriber::EnvFilter;

/// Beamtask laser synchronization — supervisory control task
#[derive(Parser, Debug)]
#[command(name = "beamtask_lsync")]
#[command(version)]
#[command(about = "Cyclic supervisory controller with latching interlock and tracking")]
struct Args {
    /// Path to the task configuration TOML.
    #[arg(default_value = "config/lsync.toml")]
    config: PathBuf,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("beamtask lsync v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("beamtask lsync shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = LsyncConfig::load(&args.config)?;
    config.validate()?;
    info!(
        "Config OK: loop_period={}s, avg_num={}, interlock_buffer_length={}",
        config.task.loop_period, config.task.avg_num, config.task.interlock_buffer_length,
    );

    let registry = Arc::new(MemoryRegistry::new());
    seed_task_signals(&registry, &config);
    install_write_logging(&registry, &config);

    let link: Arc<dyn SignalLink> = registry.clone();
    let motor = config.motor.as_ref().map(|m| {
        info!("Bound motor device '{}' (command {})", m.name, m.command);
        Box::new(SignalDevice::new(
            m.name.clone(),
            link.clone(),
            m.command.clone(),
            m.readback.clone(),
            (!m.moving.is_empty()).then(|| m.moving.clone()),
        )) as Box<dyn Device>
    });

    let mut shell = TaskShell::new(
        registry.clone(),
        config.signals.prefix.clone(),
        config.task.startup_grace_cycles,
    );
    let mut cycle = ControlCycle::new(&config, registry.clone(), motor);
    cycle.initialize(&config);

    // Stop flag flips on SIGINT; the loop observes it at the next tick.
    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        handler_stop.store(true, Ordering::SeqCst);
    })?;

    let mut scheduler = CycleScheduler::new(config.task.loop_period, stop);
    scheduler.run(&mut shell, &mut cycle);

    Ok(())
}

/// Seed the task's own signals so operators have something to poke at.
///
/// The stand-in registry starts the task enabled; a deployment bridge would
/// instead surface the host framework's enable gate.
fn seed_task_signals(registry: &MemoryRegistry, config: &LsyncConfig) {
    let prefix = &config.signals.prefix;
    registry.seed(format!("{prefix}:ENABLE"), SignalValue::Int(1));
    registry.seed(format!("{prefix}:TRACKING_ON"), SignalValue::Int(0));
    registry.seed(format!("{prefix}:AVG_RESET"), SignalValue::Int(0));
    registry.seed(format!("{prefix}:ILK_RESET"), SignalValue::Int(0));
    registry.seed(format!("{prefix}:AVG_START"), SignalValue::Int(0));
}

/// Log operator-facing writes, mirroring the host framework's
/// write-notification callbacks.
fn install_write_logging(registry: &MemoryRegistry, config: &LsyncConfig) {
    let prefix = format!("{}:", config.signals.prefix);
    registry.observe(Box::new(move |name, value| {
        let Some(suffix) = name.strip_prefix(&prefix) else {
            return;
        };
        match suffix {
            "TRACKING_ON" => {
                let on = value.as_bool().unwrap_or(false);
                info!("Tracking {}", if on { "enabled" } else { "disabled" });
            }
            "AVG_RESET" if value.as_bool().unwrap_or(false) => {
                info!("Average reset requested");
            }
            "ILK_RESET" if value.as_bool().unwrap_or(false) => {
                info!("Interlock reset requested");
            }
            "AVG_START" | "AVG_STOP" => {
                debug!("{suffix} updated to {value:?}");
            }
            _ => {}
        }
    }));
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
