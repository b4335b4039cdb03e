//! Journey logging (§4.E last paragraph, §4.H, §9): an optional, per-event structured trace. The
//! gate is a single `AtomicBool` checked before any `JourneyRecord` field is constructed, so
//! disabling it costs the hot path nothing beyond that one load (§4.E: "The hot path cost of this
//! MUST be ≤ 10% of the non-logging mean").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use core_events::EventType;

/// One processed event's full trace (§4.E). `was_substituted` is true whenever the output code
/// differs from the decoded input code (rule match or tap substitution); `was_trigger` is true
/// whenever the input code was a registered modifier-key trigger.
#[derive(Debug, Clone)]
pub struct JourneyRecord {
    pub device_id: u32,
    pub input_evdev: u16,
    pub internal_in: u16,
    pub internal_out: u16,
    pub output_evdev: u16,
    pub event_type: EventType,
    pub was_substituted: bool,
    pub was_trigger: bool,
    pub latency_ns: u64,
}

/// Trait-object observer (§9: "Coroutine/callback-shaped journey logging" → "a trait-object
/// observer called once per event; the observer is free to buffer or ship"). Implementations
/// must not block meaningfully; the hot path calls this synchronously.
pub trait JourneyObserver: Send + Sync {
    fn on_event(&self, record: &JourneyRecord);
}

/// Ships every record to `tracing` at `trace!` level. The default observer wired by the daemon
/// when `--journey` is passed.
pub struct TracingJourneyObserver;

impl JourneyObserver for TracingJourneyObserver {
    fn on_event(&self, record: &JourneyRecord) {
        tracing::trace!(
            target: "journey",
            device_id = record.device_id,
            input_evdev = record.input_evdev,
            internal_in = record.internal_in,
            internal_out = record.internal_out,
            output_evdev = record.output_evdev,
            event_type = %record.event_type,
            was_substituted = record.was_substituted,
            was_trigger = record.was_trigger,
            latency_ns = record.latency_ns,
            "journey_event"
        );
    }
}

/// Gate + observer pair owned by `EventProcessor`. `enabled()` is the only thing consulted on
/// the hot path when no observer is installed.
#[derive(Clone)]
pub struct JourneyGate {
    enabled: Arc<AtomicBool>,
    observer: Option<Arc<dyn JourneyObserver>>,
}

impl Default for JourneyGate {
    fn default() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(false)),
            observer: None,
        }
    }
}

impl JourneyGate {
    pub fn new(observer: Arc<dyn JourneyObserver>) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(false)),
            observer: Some(observer),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.observer.is_some() && self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    pub fn emit(&self, record: JourneyRecord) {
        if let Some(observer) = &self.observer {
            observer.on_event(&record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        records: Mutex<Vec<JourneyRecord>>,
    }

    impl JourneyObserver for RecordingObserver {
        fn on_event(&self, record: &JourneyRecord) {
            self.records.lock().unwrap().push(record.clone());
        }
    }

    fn sample_record() -> JourneyRecord {
        JourneyRecord {
            device_id: 0,
            input_evdev: 30,
            internal_in: 30,
            internal_out: 30,
            output_evdev: 30,
            event_type: EventType::Press,
            was_substituted: false,
            was_trigger: false,
            latency_ns: 100,
        }
    }

    #[test]
    fn disabled_gate_never_calls_observer() {
        let observer = Arc::new(RecordingObserver::default());
        let gate = JourneyGate::new(observer.clone());
        assert!(!gate.is_enabled());
    }

    #[test]
    fn enabled_gate_forwards_to_observer() {
        let observer = Arc::new(RecordingObserver::default());
        let gate = JourneyGate::new(observer.clone());
        gate.set_enabled(true);
        assert!(gate.is_enabled());
        gate.emit(sample_record());
        assert_eq!(observer.records.lock().unwrap().len(), 1);
    }

    #[test]
    fn gate_without_observer_reports_disabled() {
        let gate = JourneyGate::default();
        assert!(!gate.is_enabled());
        gate.set_enabled(true);
        // Still false: no observer installed to receive records.
        assert!(!gate.is_enabled());
    }
}
