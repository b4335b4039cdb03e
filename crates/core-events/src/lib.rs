//! Wire types for the remap engine: submit/inject events, focus-change
//! notifications, the IPC control surface, and process exit codes.
//!
//! Scope: this crate only defines data. The engine's hot path (`core-engine`)
//! and the OS adapter (`core-input`) are the only consumers that interpret
//! these types; nothing here does I/O.

use std::fmt;
use std::sync::atomic::AtomicU64;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

// -------------------------------------------------------------------------------------------------
// Channel policy
// -------------------------------------------------------------------------------------------------
// The background control loop (IPC responder, focus-change handler, metrics reporter) uses a
// bounded mpsc channel sized by `EVENT_CHANNEL_CAP`. The hot path itself never touches this
// channel: physical key events flow through `core-engine`'s own dedicated crossbeam channel so a
// slow background consumer can never add latency to `EventProcessor::process`.
pub const EVENT_CHANNEL_CAP: usize = 8192;

pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
pub static FOCUS_CHANGES_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static CONFIG_RELOADS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Background-loop event. Distinct from the hot-path `SubmitEvent`/`InjectEvent` pair below:
/// these drive the control plane (§5 background thread pool), never the per-keystroke pipeline.
#[derive(Debug, Clone)]
pub enum Event {
    FocusChanged(FocusChange),
    ConfigReloadRequested(Option<String>),
    /// Periodic monotonic tick used to drive the metrics reporter (§4.H).
    Tick,
    Shutdown,
}

/// Optional hooks that can observe background-loop events. Kept minimal to avoid cross-crate
/// coupling; consumers provide their own impls in higher layers.
pub trait EventHooks: Send + Sync + 'static {
    fn pre_handle(&self, _event: &Event) {}
    fn post_handle(&self, _event: &Event) {}
}

pub struct NoopEventHooks;

impl EventHooks for NoopEventHooks {}

/// Trait implemented by any async event producer feeding the background control loop. Each
/// source spawns one background task that pushes `Event`s into the shared channel and must
/// terminate when `tx.send(..).await` fails (consumer dropped).
pub trait AsyncEventSource: Send + 'static {
    fn name(&self) -> &'static str;
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()>;
}

/// Registry of background event sources. Stores boxed trait objects and spawns them all at
/// startup.
#[derive(Default)]
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn AsyncEventSource>>,
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: AsyncEventSource>(&mut self, src: S) {
        self.sources.push(Box::new(src));
    }

    /// Spawn all registered sources, returning their `JoinHandle`s. Each source receives its own
    /// clone of `tx`; the caller keeps the original and should drop it before awaiting shutdown
    /// so sources observe the closed channel and exit cooperatively.
    pub fn spawn_all(&mut self, tx: &Sender<Event>) -> Vec<JoinHandle<()>> {
        let mut out = Vec::with_capacity(self.sources.len());
        for src in self.sources.drain(..) {
            let name = src.name();
            tracing::info!(target: "runtime.events", source = name, "spawning event source");
            out.push(src.spawn(tx.clone()));
        }
        out
    }
}

/// Built-in monotonic tick source driving the metrics reporter (§4.H).
pub struct TickEventSource {
    interval: std::time::Duration,
}

impl TickEventSource {
    pub fn new(interval: std::time::Duration) -> Self {
        Self { interval }
    }
}

impl AsyncEventSource for TickEventSource {
    fn name(&self) -> &'static str {
        "tick"
    }
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        let dur = self.interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dur);
            loop {
                interval.tick().await;
                if tx.send(Event::Tick).await.is_err() {
                    break;
                }
            }
        })
    }
}

// -------------------------------------------------------------------------------------------------
// Hot-path wire types (§6 External Interfaces)
// -------------------------------------------------------------------------------------------------

/// Raw value carried by a `SubmitEvent`, matching the OS adapter's evdev `value` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventValue {
    Release = 0,
    Press = 1,
    Repeat = 2,
}

/// Event submitted to the core by the input-provider contract (§6). `device_id` distinguishes
/// physical devices when multiple keyboards are grabbed; the core makes no ordering promise
/// across devices beyond the OS's own readiness order (§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmitEvent {
    pub device_id: u32,
    pub evdev_code: u16,
    pub value: EventValue,
    pub timestamp_ns: u64,
}

/// PRESS/RELEASE as tracked once `EventValue::Repeat` has been folded into PRESS for rule
/// matching (§6: "REPEAT is treated as PRESS for rule matching").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Press,
    Release,
}

impl From<EventValue> for EventType {
    fn from(value: EventValue) -> Self {
        match value {
            EventValue::Release => EventType::Release,
            EventValue::Press | EventValue::Repeat => EventType::Press,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Press => write!(f, "PRESS"),
            EventType::Release => write!(f, "RELEASE"),
        }
    }
}

/// Event emitted by the core via the injection contract (§6). The adapter is responsible for
/// synthesizing REPEAT streams, expanding tap events to PRESS+RELEASE, and writing under a sync
/// barrier between logical events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InjectEvent {
    pub evdev_code: u16,
    pub kind: EventType,
    pub is_from_tap_expansion: bool,
}

/// Focus snapshot delivered by `notify_focus` (§3, §6). Must be idempotent per identity tuple;
/// the resolver compares against its last-seen snapshot before recomputing candidate keymaps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FocusChange {
    pub thread_id: u64,
    pub window_handle: u64,
    pub class: String,
    pub title: String,
    pub is_console: bool,
}

// -------------------------------------------------------------------------------------------------
// IPC control surface (§6) — typed messages only, no transport implemented here.
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IpcRequest {
    GetStatus,
    GetLockStatus,
    SetEnabled { enabled: bool },
    SwitchConfig { name: String },
    ReloadConfig { name: Option<String> },
    EnableInvestigateMode,
    DisableInvestigateMode,
    InvestigateWindow { handle: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineStatus {
    pub engine_running: bool,
    pub enabled: bool,
    pub active_config: Option<String>,
    pub last_error: Option<String>,
}

/// Response echoing the originating command with a status payload (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcResponse {
    pub command: IpcRequest,
    pub status: EngineStatus,
}

// -------------------------------------------------------------------------------------------------
// Process exit codes (§6)
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    UsageOrValidation = 1,
    Permission = 2,
    ConfigLoadFailure = 3,
    RuntimeIoFailure = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

pub type EventResult<T> = anyhow::Result<T>;
