//! Named-signal registry boundary.
//!
//! Every external quantity a task touches — hardware readbacks, actuator
//! commands, the task's own status outputs — is addressed by name through
//! [`SignalLink`]. The real control-system transport lives behind this trait;
//! [`MemoryRegistry`] is the in-process implementation used by binaries,
//! tests, and benches.
//!
//! Absence is a first-class outcome: `read` returns `Ok(None)` for a signal
//! that is unknown or currently disconnected. Only a transport-level fault
//! produces `Err`.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Value carried by a named signal.
///
/// Mirrors the value kinds a control-system channel can hold: scalars,
/// flags, strings, and array records (waveforms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalValue {
    /// Floating-point scalar.
    Float(f64),
    /// Integer scalar.
    Int(i64),
    /// Boolean flag.
    Bool(bool),
    /// Free-form string (status text, enumerated commands).
    Text(String),
    /// Array record, e.g. a digitizer trace.
    Waveform(Vec<f64>),
}

impl SignalValue {
    /// Numeric view of the value. `Text` and `Waveform` have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Text(_) | Self::Waveform(_) => None,
        }
    }

    /// Integer view of the value (floats are truncated).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Float(v) if v.is_finite() => Some(*v as i64),
            Self::Float(_) => None,
            Self::Int(v) => Some(*v),
            Self::Bool(v) => Some(i64::from(*v)),
            Self::Text(_) | Self::Waveform(_) => None,
        }
    }

    /// Truthiness of the value: nonzero scalars are true.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Float(v) => Some(*v != 0.0),
            Self::Int(v) => Some(*v != 0),
            Self::Bool(v) => Some(*v),
            Self::Text(_) | Self::Waveform(_) => None,
        }
    }

    /// Waveform view of the value.
    pub fn as_waveform(&self) -> Option<&[f64]> {
        match self {
            Self::Waveform(w) => Some(w),
            _ => None,
        }
    }
}

/// Transport-level failure on a signal read or write.
///
/// Distinct from absence: a disconnected or unknown signal reads as
/// `Ok(None)`, while `SignalError` means the link itself failed and the
/// current cycle cannot trust any of its acquisitions.
#[derive(Debug, Clone, Error)]
#[error("transport failure on signal '{signal}': {reason}")]
pub struct SignalError {
    /// Name of the signal being accessed.
    pub signal: String,
    /// Human-readable failure description.
    pub reason: String,
}

/// Best-effort access to named signals.
///
/// Implementations must be shareable across threads: the cycle loop owns one
/// handle, while the host process (CLI, shutdown handler) may hold others.
pub trait SignalLink: Send + Sync {
    /// Read the current value of a signal. `Ok(None)` when the signal is
    /// unknown or has no value — a valid outcome, not an error.
    fn read(&self, name: &str) -> Result<Option<SignalValue>, SignalError>;

    /// Write a value to a signal. Best effort; callers log failures rather
    /// than treating them as fatal.
    fn write(&self, name: &str, value: SignalValue) -> Result<(), SignalError>;
}

/// Callback invoked after a value is stored by [`MemoryRegistry::write`].
pub type WriteObserver = Box<dyn Fn(&str, &SignalValue) + Send + Sync>;

/// In-process signal registry.
///
/// Backed by a name→value map; writes notify registered observers, mirroring
/// the write-notification callbacks of the external PV layer. Built at task
/// startup, shared by handle afterwards.
#[derive(Default)]
pub struct MemoryRegistry {
    values: RwLock<HashMap<String, SignalValue>>,
    observers: RwLock<Vec<WriteObserver>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an initial value without notifying observers.
    pub fn seed(&self, name: impl Into<String>, value: SignalValue) {
        self.values.write().insert(name.into(), value);
    }

    /// Register a write-notification observer.
    ///
    /// Observers run synchronously inside `write`, after the value is stored.
    pub fn observe(&self, observer: WriteObserver) {
        self.observers.write().push(observer);
    }

    /// Snapshot of currently registered signal names, for diagnostics.
    pub fn names(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }
}

impl SignalLink for MemoryRegistry {
    fn read(&self, name: &str) -> Result<Option<SignalValue>, SignalError> {
        Ok(self.values.read().get(name).cloned())
    }

    fn write(&self, name: &str, value: SignalValue) -> Result<(), SignalError> {
        self.values
            .write()
            .insert(name.to_string(), value.clone());
        for observer in self.observers.read().iter() {
            observer(name, &value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn absent_signal_reads_none() {
        let registry = MemoryRegistry::new();
        assert_eq!(registry.read("LSYNC:NOPE").unwrap(), None);
    }

    #[test]
    fn write_then_read() {
        let registry = MemoryRegistry::new();
        registry
            .write("LSYNC:CORR", SignalValue::Float(0.25))
            .unwrap();
        assert_eq!(
            registry.read("LSYNC:CORR").unwrap(),
            Some(SignalValue::Float(0.25))
        );
    }

    #[test]
    fn seed_does_not_notify() {
        let registry = MemoryRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        registry.observe(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.seed("LSYNC:ENABLE", SignalValue::Bool(true));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        registry
            .write("LSYNC:TRACKING_ON", SignalValue::Int(1))
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn observer_sees_name_and_value() {
        let registry = MemoryRegistry::new();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let sink = seen.clone();
        registry.observe(Box::new(move |name, value| {
            sink.write().push((name.to_string(), value.clone()));
        }));

        registry
            .write("LSYNC:AVG_RESET", SignalValue::Int(1))
            .unwrap();
        let log = seen.read();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "LSYNC:AVG_RESET");
        assert_eq!(log[0].1, SignalValue::Int(1));
    }

    #[test]
    fn numeric_coercions() {
        assert_eq!(SignalValue::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(SignalValue::Int(-3).as_f64(), Some(-3.0));
        assert_eq!(SignalValue::Bool(true).as_f64(), Some(1.0));
        assert_eq!(SignalValue::Text("on".into()).as_f64(), None);

        assert_eq!(SignalValue::Float(2.9).as_i64(), Some(2));
        assert_eq!(SignalValue::Float(f64::NAN).as_i64(), None);

        assert_eq!(SignalValue::Int(0).as_bool(), Some(false));
        assert_eq!(SignalValue::Float(0.1).as_bool(), Some(true));
        assert_eq!(SignalValue::Bool(false).as_bool(), Some(false));

        let wave = SignalValue::Waveform(vec![1.0, 2.0]);
        assert_eq!(wave.as_waveform(), Some(&[1.0, 2.0][..]));
        assert_eq!(wave.as_f64(), None);
    }
}
