//! OS adapter port (§1, §4, §6 External Interfaces): the `InputProvider` /
//! `OutputInjector` trait boundary the core sees instead of a concrete
//! evdev/uinput dependency.
//!
//! The core never talks to `/dev/input` directly. It is handed a `Box<dyn
//! InputProvider>` that yields `SubmitEvent`s and a `Box<dyn OutputInjector>`
//! that accepts `InjectEvent`s; a real Linux build wires the `evdev`/`uinput`
//! crates behind the `linux-hw` feature (§1: "the core sees only abstract
//! (evdev_code, PRESS/RELEASE) events in... and out"), while every test in
//! this workspace drives the deterministic in-memory pair instead.

pub mod test_provider;

#[cfg(all(target_os = "linux", feature = "linux-hw"))]
pub mod linux;

use core_events::{InjectEvent, SubmitEvent};
use thiserror::Error;

pub use test_provider::{RecordingOutputInjector, TestInputProvider};

/// Failure injecting an output event (§7 `injection_failed`). Never raised by `core-engine`
/// itself; only the OS adapter's concrete `OutputInjector` impls produce it.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("failed to open virtual output device: {0}")]
    DeviceOpen(String),
    #[error("write to virtual device failed: {0}")]
    Write(String),
}

/// Failure opening/grabbing a physical input device at startup (§6, §7). Fatal: the daemon maps
/// this to `ExitCode::Permission` or `ExitCode::RuntimeIoFailure`.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to open input device {path}: {source}")]
    Open { path: String, source: std::io::Error },
    #[error("failed to grab input device {path} exclusively: {reason}")]
    Grab { path: String, reason: String },
    #[error("device read failed: {0}")]
    Read(String),
}

/// Source of physical key events (§6 input-provider contract). Implementations MUST have
/// already exclusively grabbed the device before the core begins calling `recv` (§6: "Devices
/// MUST be exclusively grabbed by the OS adapter before the core begins processing them").
///
/// `recv` blocks the calling (hot-path) thread until an event is available or the device closes;
/// it performs no heap allocation beyond what the underlying OS binding requires.
pub trait InputProvider: Send {
    /// Block until the next event is available. Returns `Ok(None)` on orderly device closure
    /// (e.g. the process is shutting down), never on an empty read.
    fn recv(&mut self) -> Result<Option<SubmitEvent>, InputError>;
}

/// Destination for the core's output events (§6 injection contract). The adapter is responsible
/// for (a) synthesizing REPEAT streams if the downstream consumer expects them, (b) expanding
/// tap events to PRESS+RELEASE (the core only sets `is_from_tap_expansion`; it does not itself
/// emit the second event), and (c) writing under a sync barrier between logical events.
pub trait OutputInjector: Send {
    fn inject(&mut self, event: InjectEvent) -> Result<(), InjectError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::{EventType, EventValue};

    #[test]
    fn test_provider_round_trips_queued_events() {
        let mut provider = TestInputProvider::new();
        provider.push(SubmitEvent {
            device_id: 0,
            evdev_code: 30,
            value: EventValue::Press,
            timestamp_ns: 0,
        });
        let got = provider.recv().unwrap();
        assert_eq!(got.unwrap().evdev_code, 30);
        assert!(provider.recv().unwrap().is_none());
    }

    #[test]
    fn recording_injector_captures_in_order() {
        let mut injector = RecordingOutputInjector::new();
        injector
            .inject(InjectEvent {
                evdev_code: 30,
                kind: EventType::Press,
                is_from_tap_expansion: false,
            })
            .unwrap();
        injector
            .inject(InjectEvent {
                evdev_code: 30,
                kind: EventType::Release,
                is_from_tap_expansion: false,
            })
            .unwrap();
        assert_eq!(injector.events().len(), 2);
    }
}
