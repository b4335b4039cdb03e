//! Linux OS adapter (§1, §4.A, §6): a real `InputProvider` backed by `evdev` device grabs and a
//! real `OutputInjector` backed by a `uinput` virtual keyboard. Gated behind `target_os =
//! "linux"` and the `linux-hw` feature since neither crate builds (or is meaningful) off Linux;
//! every other platform and every test uses [`crate::TestInputProvider`] /
//! [`crate::RecordingOutputInjector`] instead.

use std::path::{Path, PathBuf};

use core_events::{EventValue, InjectEvent, SubmitEvent};

use crate::{InjectError, InputError, InputProvider, OutputInjector};

/// Opens and exclusively grabs one `/dev/input/eventN` node (§6: "Devices MUST be exclusively
/// grabbed by the OS adapter before the core begins processing them").
pub struct EvdevInputProvider {
    device: evdev::Device,
    device_id: u32,
    path: PathBuf,
}

impl EvdevInputProvider {
    pub fn open(path: impl AsRef<Path>, device_id: u32) -> Result<Self, InputError> {
        let path = path.as_ref().to_path_buf();
        let mut device = evdev::Device::open(&path).map_err(|source| InputError::Open {
            path: path.display().to_string(),
            source,
        })?;
        device.grab().map_err(|e| InputError::Grab {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            device,
            device_id,
            path,
        })
    }
}

impl InputProvider for EvdevInputProvider {
    fn recv(&mut self) -> Result<Option<SubmitEvent>, InputError> {
        loop {
            let events = self
                .device
                .fetch_events()
                .map_err(|e| InputError::Read(e.to_string()))?;
            for event in events {
                if let evdev::InputEventKind::Key(key) = event.kind() {
                    let value = match event.value() {
                        0 => EventValue::Release,
                        1 => EventValue::Press,
                        _ => EventValue::Repeat,
                    };
                    return Ok(Some(SubmitEvent {
                        device_id: self.device_id,
                        evdev_code: key.code(),
                        value,
                        timestamp_ns: event
                            .timestamp()
                            .duration_since(std::time::UNIX_EPOCH)
                            .map(|d| d.as_nanos() as u64)
                            .unwrap_or(0),
                    }));
                }
                // Non-key events (EV_SYN, EV_MSC, LED feedback) carry no rule-matching
                // information; the adapter skips them rather than forwarding noise to §4.E.
            }
        }
    }
}

impl Drop for EvdevInputProvider {
    fn drop(&mut self) {
        if let Err(e) = self.device.ungrab() {
            tracing::warn!(target: "core_input.linux", path = %self.path.display(), error = %e, "ungrab_failed");
        }
    }
}

/// Virtual keyboard the core's output events are written to via `uinput` (§1, §6 injection
/// contract). A sync barrier (`synchronize`) follows every logical event so downstream consumers
/// never observe a half-applied key combination.
pub struct UinputOutputInjector {
    device: uinput::Device,
}

impl UinputOutputInjector {
    pub fn create(name: &str) -> Result<Self, InjectError> {
        let device = uinput::default()
            .map_err(|e| InjectError::DeviceOpen(e.to_string()))?
            .name(name)
            .map_err(|e| InjectError::DeviceOpen(e.to_string()))?
            .event(uinput::event::Keyboard::All)
            .map_err(|e| InjectError::DeviceOpen(e.to_string()))?
            .create()
            .map_err(|e| InjectError::DeviceOpen(e.to_string()))?;
        Ok(Self { device })
    }
}

impl OutputInjector for UinputOutputInjector {
    fn inject(&mut self, event: InjectEvent) -> Result<(), InjectError> {
        let value = match event.kind {
            core_events::EventType::Press => 1,
            core_events::EventType::Release => 0,
        };
        self.device
            .send(uinput::event::Code::ByCode(i32::from(event.evdev_code) as u32), value)
            .map_err(|e| InjectError::Write(e.to_string()))?;
        self.device
            .synchronize()
            .map_err(|e| InjectError::Write(e.to_string()))
    }
}
