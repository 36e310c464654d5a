//! Cross-module boundary tests: registry, shell, and device working
//! together through `Arc<dyn SignalLink>`, the way a task binary wires them.

use beamtask_common::device::{Device, SignalDevice};
use beamtask_common::signal::{MemoryRegistry, SignalLink, SignalValue};
use beamtask_common::task::{TaskShell, TaskStatus};
use std::sync::Arc;

#[test]
fn shell_and_device_share_one_registry() {
    let registry = Arc::new(MemoryRegistry::new());
    let link: Arc<dyn SignalLink> = registry.clone();

    registry.seed("DEMO:ENABLE", SignalValue::Bool(true));
    registry.seed("MOT:m0:RBV", SignalValue::Float(0.5));

    let mut shell = TaskShell::new(link.clone(), "DEMO", 10);
    let mut motor = SignalDevice::new("m0", link, "MOT:m0:RLV", "MOT:m0:RBV", None);

    assert!(shell.is_enabled());
    assert!(shell.in_startup_grace());

    motor.set(0.01).unwrap();
    shell.set_status(TaskStatus::Running);
    shell.step_cycle();

    assert_eq!(
        registry.read("MOT:m0:RLV").unwrap(),
        Some(SignalValue::Float(0.01))
    );
    assert_eq!(
        registry.read("DEMO:STATUS").unwrap(),
        Some(SignalValue::Text("RUNNING".into()))
    );
    assert_eq!(
        registry.read("DEMO:CYCLE").unwrap(),
        Some(SignalValue::Int(1))
    );
    assert_eq!(motor.position(), 0.5);
}

#[test]
fn write_observers_see_device_commands() {
    let registry = Arc::new(MemoryRegistry::new());
    let commands: Arc<parking_lot::Mutex<Vec<String>>> = Arc::default();
    let sink = commands.clone();
    registry.observe(Box::new(move |name, _| {
        sink.lock().push(name.to_string());
    }));

    let link: Arc<dyn SignalLink> = registry.clone();
    let mut motor = SignalDevice::new("m0", link, "MOT:m0:RLV", "MOT:m0:RBV", None);
    motor.set(-0.02).unwrap();

    assert_eq!(commands.lock().as_slice(), &["MOT:m0:RLV".to_string()]);
}
