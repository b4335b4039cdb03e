//! remapd entrypoint (§2 "Daemon binary", §5, §6): loads a compiled configuration, wires it into
//! `EventProcessor`, and owns both the hot-path thread and the background `tokio` pool (action
//! executor drain, metrics reporter, focus-change/config-reload handling).
//!
//! Nothing on the hot-path thread ever `.await`s; the only bridge between the two worlds is the
//! bounded `crossbeam_channel` the event processor enqueues matched actions onto, and the
//! `tokio::sync::mpsc` channel background event sources push control-plane events onto.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use core_actions::dispatcher::{
    dispatch, ActionExecutor, ExecutorContext, ExternalActionHost, NoopExternalActionHost,
    SequenceInjector,
};
use core_config::Config;
use core_engine::{EventProcessor, JourneyGate, LatencyStats, TracingJourneyObserver};
use core_events::{Event, EventSourceRegistry, EventType, ExitCode, InjectEvent, TickEventSource};
use core_input::{InputProvider, OutputInjector, RecordingOutputInjector, TestInputProvider};
use core_keycode::InternalCode;
use core_keymap::FocusResolver;
use core_modifier::ModifierKeyHandler;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// How often the background loop logs aggregated latency stats (§4.H: a background reporter
/// prints aggregated stats periodically).
const METRICS_REPORT_INTERVAL: Duration = Duration::from_secs(30);
const ACTION_QUEUE_CAPACITY: usize = 4096;

/// CLI arguments, mirroring the teacher's own `#[derive(Parser)]` shape.
#[derive(Parser, Debug)]
#[command(name = "remapd", version, about = "User-space keyboard remapping daemon")]
struct Args {
    /// Path to `remap.toml`. Falls back to `core_config::discover()` when omitted.
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Emit a per-event structured journey trace at `target=journey`, `trace` level (§4.H).
    #[arg(long)]
    journey: bool,
    /// `/dev/input/eventN` node to grab exclusively. Required on `linux-hw` builds; ignored
    /// otherwise.
    #[arg(long)]
    device: Option<PathBuf>,
}

/// A fatal startup/runtime error paired with the exit code it maps to (§6, §7).
struct Fatal {
    code: ExitCode,
    error: anyhow::Error,
}

impl Fatal {
    fn new(code: ExitCode, error: anyhow::Error) -> Self {
        Self { code, error }
    }
}

struct AppStartup {
    log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn new() -> Self {
        Self { log_guard: None }
    }

    fn configure_logging(&mut self) {
        let log_dir = std::path::Path::new(".");
        let file_appender = tracing_appender::rolling::never(log_dir, "remapd.log");
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        match tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(nb_writer)
            .try_init()
        {
            Ok(_) => self.log_guard = Some(guard),
            Err(_err) => {
                // A global subscriber is already installed (e.g. under a test harness); drop the
                // guard so its writer thread shuts down rather than leaking.
            }
        }
    }

    fn install_panic_hook() {
        static HOOK: std::sync::Once = std::sync::Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return exit_code(ExitCode::RuntimeIoFailure);
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => exit_code(ExitCode::Success),
        Err(fatal) => {
            error!(target: "runtime", error = ?fatal.error, code = ?fatal.code, "fatal");
            exit_code(fatal.code)
        }
    }
}

fn exit_code(code: ExitCode) -> std::process::ExitCode {
    std::process::ExitCode::from(code as i32 as u8)
}

async fn run(args: Args) -> Result<(), Fatal> {
    let mut startup = AppStartup::new();
    startup.configure_logging();
    AppStartup::install_panic_hook();
    info!(target: "runtime", "startup");

    let config = core_config::load_config(args.config.clone())
        .map_err(|e| Fatal::new(ExitCode::ConfigLoadFailure, e.into()))?;

    let resolver = Arc::new(FocusResolver::new(config.arena, config.default_keymap));
    let mut handler = ModifierKeyHandler::new();
    for trigger in &config.triggers {
        handler.register(*trigger);
    }

    let journey_gate = build_journey_gate(args.journey);

    let (executor, receiver) = ActionExecutor::new(ACTION_QUEUE_CAPACITY);
    let processor = Arc::new(
        EventProcessor::new(resolver.clone(), handler)
            .with_action_sender(executor.sender().clone())
            .with_journey(journey_gate),
    );
    processor.install_actions(Arc::from(config.actions));

    let lock_path = core_config::default_lock_state_path();
    let locks = restore_lock_state(&lock_path, &config);
    processor.seed_locks(&locks);

    let (input_provider, output_injector) = build_os_adapter(&args)?;
    let output_injector: SharedInjector = Arc::new(Mutex::new(output_injector));

    let (tx, mut rx) = mpsc::channel::<Event>(core_events::EVENT_CHANNEL_CAP);
    let mut registry = EventSourceRegistry::new();
    registry.register(TickEventSource::new(METRICS_REPORT_INTERVAL));
    let source_handles = registry.spawn_all(&tx);

    // The action executor runs on its own OS thread, not the tokio pool: `dispatch` needs
    // `&mut` access to the same `ModifierState`/`PrefixStack` the hot path locks (§5, §9 "split
    // critical section"), which `EventProcessor::with_state_locked` brokers.
    let _action_worker =
        spawn_action_worker(receiver, processor.clone(), resolver.clone(), output_injector.clone())
            .context("failed to spawn action-executor thread")
            .map_err(|e| Fatal::new(ExitCode::RuntimeIoFailure, e))?;

    let hot_path_tx = tx.clone();
    let hot_path_processor = processor.clone();
    let hot_path_injector = output_injector.clone();
    let hot_path = std::thread::Builder::new()
        .name("remap-hotpath".to_string())
        .spawn(move || run_hot_path(input_provider, hot_path_injector, hot_path_processor, hot_path_tx))
        .context("failed to spawn hot-path thread")
        .map_err(|e| Fatal::new(ExitCode::RuntimeIoFailure, e))?;
    drop(tx);

    run_background_loop(&mut rx, &processor).await;

    for handle in source_handles {
        if tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .is_err()
        {
            warn!(target: "runtime.shutdown", "event_source_task_timeout");
        }
    }

    if let Err(err) = hot_path.join() {
        error!(target: "runtime.shutdown", ?err, "hot_path_thread_panicked");
    }

    if let Err(err) = core_config::persist_locks(&lock_path, &processor.active_locks()) {
        warn!(target: "runtime.shutdown", ?err, "lock_persist_failed");
    }

    info!(target: "runtime", "shutdown_complete");
    Ok(())
}

fn build_journey_gate(enabled: bool) -> JourneyGate {
    if !enabled {
        return JourneyGate::default();
    }
    let gate = JourneyGate::new(Arc::new(TracingJourneyObserver));
    gate.set_enabled(true);
    gate
}

/// Restore the persisted lock sidecar (§6 "Persisted state"); a malformed sidecar is logged and
/// ignored in favor of the configuration's declared `[locks]` defaults rather than refusing to
/// start the daemon over stale state.
fn restore_lock_state(lock_path: &std::path::Path, config: &Config) -> Vec<u8> {
    match core_config::restore_locks(lock_path) {
        Ok(locks) if !locks.is_empty() => locks,
        Ok(_) => config.initial_locks.clone(),
        Err(err) => {
            warn!(target: "runtime.startup", ?err, "lock_sidecar_unreadable_using_config_defaults");
            config.initial_locks.clone()
        }
    }
}

type SharedInjector = Arc<Mutex<Box<dyn OutputInjector + Send>>>;

/// Bridges `core_actions::SequenceInjector` (what the action dispatcher needs for
/// `KeySequence`/`Repeat`) onto the same `OutputInjector` the hot path writes through, so a
/// scripted action and a live key both end up on the one virtual device (§4.G).
struct InjectorBridge(SharedInjector);

impl SequenceInjector for InjectorBridge {
    fn inject(&self, code: InternalCode, event: EventType) {
        let evdev_code = core_keycode::internal_to_evdev(code);
        if evdev_code == 0 {
            warn!(target: "action_executor", code, "key_sequence_encode_miss");
            return;
        }
        let mut guard = self.0.lock().unwrap();
        if let Err(err) = guard.inject(InjectEvent {
            evdev_code,
            kind: event,
            is_from_tap_expansion: false,
        }) {
            error!(target: "action_executor", ?err, "sequence_injection_failed");
        }
    }
}

fn spawn_action_worker(
    receiver: crossbeam_channel::Receiver<core_actions::QueuedAction>,
    processor: Arc<EventProcessor>,
    resolver: Arc<FocusResolver>,
    injector: SharedInjector,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    let external_host: Arc<dyn ExternalActionHost> = Arc::new(NoopExternalActionHost);
    let mut variables: HashMap<String, i64> = HashMap::new();
    ActionExecutor::spawn_worker(receiver, move |queued| {
        let Some(action) = queued.resolve() else {
            return;
        };
        let seq_injector = InjectorBridge(injector.clone());
        processor.with_state_locked(|modifier_state, prefix_stack| {
            let mut ctx = ExecutorContext {
                modifier_state,
                prefix_stack,
                resolver: &resolver,
                variables: &mut variables,
                injector: &seq_injector,
                external_host: external_host.as_ref(),
            };
            dispatch(action, &mut ctx);
        });
    })
}

/// The hot-path loop (§5): `InputProvider::recv` → `EventProcessor::process` →
/// `OutputInjector::inject`, with no `.await` anywhere in the chain. Exits when the input device
/// closes or errors, and signals the background loop to shut down behind it.
fn run_hot_path(
    mut input: Box<dyn InputProvider + Send>,
    injector: SharedInjector,
    processor: Arc<EventProcessor>,
    shutdown_tx: mpsc::Sender<Event>,
) {
    loop {
        match input.recv() {
            Ok(Some(submit)) => {
                let event_type = EventType::from(submit.value);
                let processed = processor.process(
                    submit.device_id,
                    submit.evdev_code,
                    event_type,
                    submit.timestamp_ns,
                );
                if !processed.valid {
                    continue;
                }
                let mut guard = injector.lock().unwrap();
                if processed.is_tap {
                    // §6 injection contract: the core only marks the tap; the adapter is
                    // responsible for synthesizing the PRESS+RELEASE pair.
                    let _ = guard.inject(InjectEvent {
                        evdev_code: processed.output_evdev,
                        kind: EventType::Press,
                        is_from_tap_expansion: true,
                    });
                    let _ = guard.inject(InjectEvent {
                        evdev_code: processed.output_evdev,
                        kind: EventType::Release,
                        is_from_tap_expansion: true,
                    });
                } else if let Err(err) = guard.inject(InjectEvent {
                    evdev_code: processed.output_evdev,
                    kind: processed.kind,
                    is_from_tap_expansion: false,
                }) {
                    error!(target: "runtime.hotpath", ?err, "injection_failed");
                }
            }
            Ok(None) => {
                info!(target: "runtime.hotpath", "input_device_closed");
                break;
            }
            Err(err) => {
                error!(target: "runtime.hotpath", ?err, "input_read_failed");
                break;
            }
        }
    }
    let _ = shutdown_tx.blocking_send(Event::Shutdown);
}

/// The background control loop (§5 background thread pool): focus changes, config reloads, the
/// periodic metrics tick, and shutdown all funnel through here. Never touches the hot path's
/// `crossbeam_channel`.
async fn run_background_loop(rx: &mut mpsc::Receiver<Event>, processor: &Arc<EventProcessor>) {
    while let Some(event) = rx.recv().await {
        match event {
            Event::Tick => report_metrics(processor),
            Event::FocusChanged(change) => {
                core_events::FOCUS_CHANGES_TOTAL.fetch_add(1, Ordering::Relaxed);
                let keymap = processor
                    .resolver()
                    .notify_focus(&change.class, &change.title, change.is_console);
                info!(
                    target: "runtime.focus",
                    class = %change.class,
                    title = %change.title,
                    keymap = keymap.0,
                    "focus_changed"
                );
            }
            Event::ConfigReloadRequested(path) => reload_config(processor, path),
            Event::Shutdown => {
                info!(target: "runtime.shutdown", "shutdown_event_received");
                break;
            }
        }
    }
}

fn report_metrics(processor: &EventProcessor) {
    let stats = LatencyStats::compute(processor.metrics().snapshot());
    if stats.count == 0 {
        return;
    }
    info!(
        target: "metrics",
        count = stats.count,
        mean_ns = stats.mean_ns,
        p50_ns = stats.p50_ns,
        p95_ns = stats.p95_ns,
        p99_ns = stats.p99_ns,
        "latency_report"
    );
}

/// Reload the compiled configuration from `path` (or the default discovery path). A failed
/// reload is logged and the running engine is left untouched (§7 `config_install_rejected`) —
/// the arena/action table are only swapped once the new configuration has fully validated.
fn reload_config(processor: &EventProcessor, path: Option<String>) {
    match core_config::load_config(path.map(PathBuf::from)) {
        Ok(config) => {
            processor
                .resolver()
                .install_arena(config.arena, config.default_keymap);
            processor.install_actions(Arc::from(config.actions));
            processor.reset_modifier_state();
            core_events::CONFIG_RELOADS_TOTAL.fetch_add(1, Ordering::Relaxed);
            info!(target: "runtime.config", "config_reloaded");
        }
        Err(err) => {
            warn!(target: "runtime.config", ?err, "config_install_rejected");
        }
    }
}

#[cfg(all(target_os = "linux", feature = "linux-hw"))]
fn build_os_adapter(
    args: &Args,
) -> Result<(Box<dyn InputProvider + Send>, Box<dyn OutputInjector + Send>), Fatal> {
    let device_path = args.device.clone().ok_or_else(|| {
        Fatal::new(
            ExitCode::UsageOrValidation,
            anyhow::anyhow!("--device is required when built with the linux-hw feature"),
        )
    })?;
    let input = core_input::linux::EvdevInputProvider::open(&device_path, 0)
        .map_err(|e| Fatal::new(ExitCode::Permission, e.into()))?;
    let output = core_input::linux::UinputOutputInjector::create("remapd-virtual-keyboard")
        .map_err(|e| Fatal::new(ExitCode::RuntimeIoFailure, e.into()))?;
    Ok((Box::new(input), Box::new(output)))
}

#[cfg(not(all(target_os = "linux", feature = "linux-hw")))]
fn build_os_adapter(
    _args: &Args,
) -> Result<(Box<dyn InputProvider + Send>, Box<dyn OutputInjector + Send>), Fatal> {
    warn!(
        target: "runtime.startup",
        "linux-hw feature not compiled in: running against an empty in-memory input source"
    );
    Ok((
        Box::new(TestInputProvider::new()),
        Box::new(RecordingOutputInjector::new()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_casts_survive_the_round_trip_to_process_exit_code() {
        assert_eq!(ExitCode::Success as i32 as u8, 0);
        assert_eq!(ExitCode::UsageOrValidation as i32 as u8, 1);
        assert_eq!(ExitCode::Permission as i32 as u8, 2);
        assert_eq!(ExitCode::ConfigLoadFailure as i32 as u8, 3);
        assert_eq!(ExitCode::RuntimeIoFailure as i32 as u8, 4);
    }

    #[test]
    fn journey_gate_disabled_by_default() {
        let gate = build_journey_gate(false);
        assert!(!gate.is_enabled());
    }

    #[test]
    fn journey_gate_enabled_when_requested() {
        let gate = build_journey_gate(true);
        assert!(gate.is_enabled());
    }
}
