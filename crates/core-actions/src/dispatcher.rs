//! Action executor (§4.G, §5): the event processor pushes an `ActionHandle` onto a bounded
//! channel; a background worker thread drains it and `dispatch`es the resolved `ActionKind`
//! against an `ExecutorContext`. None of this runs on the hot path.

use std::collections::HashMap;
use std::sync::Arc;

use core_events::EventType;
use core_keycode::InternalCode;
use core_keymap::{ActionHandle, FocusResolver, PrefixStack};
use core_modifier::ModifierState;

use crate::action::{ActionKind, ExternalOp, VariableOp};

/// Opaque collaborator (§1, §9) the OS adapter supplies for action variants the core never
/// interprets: shell execution, window management, clipboard, IME toggling, and plugin
/// invocation. Also receives `Notify`/`Help`, since those are user-facing side effects with no
/// concrete implementation in the core either.
pub trait ExternalActionHost: Send + Sync {
    fn run(&self, op: &ExternalOp);
    fn notify(&self, message: &str);
    fn help(&self);
}

/// No-op host used by tests and as a safe default; every call is logged at `debug!` so a missing
/// host wiring is visible without panicking.
#[derive(Default)]
pub struct NoopExternalActionHost;

impl ExternalActionHost for NoopExternalActionHost {
    fn run(&self, op: &ExternalOp) {
        tracing::debug!(target: "action_executor", ?op, "external op dropped: no host configured");
    }
    fn notify(&self, message: &str) {
        tracing::info!(target: "action_executor", message, "notify");
    }
    fn help(&self) {
        tracing::info!(target: "action_executor", "help requested");
    }
}

/// Emits a scripted PRESS/RELEASE pair through the OS adapter's injector (§4.G `KeySequence`,
/// `Repeat`). Implemented by `core-input`'s `OutputInjector` wrapper; kept as a narrow trait here
/// so `core-actions` never depends on `core-input`.
pub trait SequenceInjector: Send + Sync {
    fn inject(&self, code: InternalCode, event: EventType);
}

/// Borrowed handles the dispatcher needs for exactly the duration of one `dispatch` call. None of
/// these are owned by `core-actions`; they are borrowed from the engine's critical section
/// (`modifier_state`, `prefix_stack`) or from long-lived singletons (`resolver`, `injector`,
/// `external_host`) owned by `core-engine`/the daemon binary.
pub struct ExecutorContext<'a> {
    pub modifier_state: &'a mut ModifierState,
    pub prefix_stack: &'a mut PrefixStack,
    pub resolver: &'a FocusResolver,
    pub variables: &'a mut HashMap<String, i64>,
    pub injector: &'a dyn SequenceInjector,
    pub external_host: &'a dyn ExternalActionHost,
}

const MAX_REPEAT_COUNT: i64 = 1_000;

/// Apply one resolved action. Never panics and never blocks on anything but `injector`/
/// `external_host` calls, which are the caller's responsibility to keep fast off the hot path.
pub fn dispatch(kind: &ActionKind, ctx: &mut ExecutorContext<'_>) {
    match kind {
        ActionKind::KeySequence(sequence) => {
            for (code, event) in sequence {
                ctx.injector.inject(*code, *event);
            }
        }
        ActionKind::ToggleLock(lock_num) => ctx.modifier_state.toggle_lock(*lock_num),
        ActionKind::PrefixPush(id) => ctx.prefix_stack.push(*id),
        ActionKind::PrefixParent => {
            if let Some(popped) = ctx.prefix_stack.pop() {
                let arena = ctx.resolver.load_arena();
                if let Some(parent) = arena.get(popped).and_then(|k| k.parent) {
                    ctx.prefix_stack.push(parent);
                }
            }
        }
        ActionKind::PrefixPrev => {
            ctx.prefix_stack.pop_to_previous();
        }
        ActionKind::PrefixCancel => ctx.prefix_stack.cancel(),
        ActionKind::Repeat { sequence, count_var } => {
            let count = ctx
                .variables
                .get(count_var)
                .copied()
                .unwrap_or(0)
                .clamp(0, MAX_REPEAT_COUNT);
            for _ in 0..count {
                for (code, event) in sequence {
                    ctx.injector.inject(*code, *event);
                }
            }
        }
        ActionKind::VariableMutate { name, op } => {
            let slot = ctx.variables.entry(name.clone()).or_insert(0);
            match op {
                VariableOp::Set(v) => *slot = *v,
                VariableOp::Increment(v) => *slot += v,
                VariableOp::Reset => *slot = 0,
            }
        }
        ActionKind::Help => ctx.external_host.help(),
        ActionKind::Notify { message } => ctx.external_host.notify(message),
        ActionKind::External(op) => ctx.external_host.run(op),
    }
}

/// One dequeued unit of work: the action table it was resolved against (captured at rule-match
/// time, so a concurrent configuration reload can never hand the worker a handle into a table
/// that no longer matches it) plus the handle itself.
#[derive(Clone)]
pub struct QueuedAction {
    pub actions: Arc<[ActionKind]>,
    pub handle: ActionHandle,
}

impl QueuedAction {
    pub fn resolve(&self) -> Option<&ActionKind> {
        self.actions.get(self.handle.0 as usize)
    }
}

/// Owns the bounded channel the hot path enqueues onto (§5: the action executor is a background
/// thread pool member, never invoked synchronously from `process`).
pub struct ActionExecutor {
    sender: crossbeam_channel::Sender<QueuedAction>,
}

impl ActionExecutor {
    pub fn new(capacity: usize) -> (Self, crossbeam_channel::Receiver<QueuedAction>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self { sender }, receiver)
    }

    pub fn sender(&self) -> &crossbeam_channel::Sender<QueuedAction> {
        &self.sender
    }

    /// Non-blocking enqueue from the hot path. Returns `false` (and drops `queued`) if the
    /// channel is full; the caller logs and bumps a metric (§5 backpressure policy).
    pub fn try_enqueue(&self, queued: QueuedAction) -> bool {
        self.sender.try_send(queued).is_ok()
    }

    /// Spawn the worker thread. `handle_message` is supplied by the caller because only it
    /// (`core-engine`/the daemon) holds the engine critical section `dispatch` needs to build an
    /// `ExecutorContext`; this thread runs until every `Sender` clone is dropped.
    ///
    /// Returns the OS error if the thread cannot be spawned (resource exhaustion), so the caller
    /// can map it to the same fatal-exit-code contract as every other startup failure (§6, §7)
    /// instead of panicking the daemon.
    pub fn spawn_worker<F>(
        receiver: crossbeam_channel::Receiver<QueuedAction>,
        mut handle_message: F,
    ) -> std::io::Result<std::thread::JoinHandle<()>>
    where
        F: FnMut(QueuedAction) + Send + 'static,
    {
        std::thread::Builder::new()
            .name("action-executor".to_string())
            .spawn(move || {
                while let Ok(queued) = receiver.recv() {
                    handle_message(queued);
                }
                tracing::debug!(target: "action_executor", "worker exiting: channel closed");
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_keymap::{FocusPredicate, Keymap, KeymapArena, KeymapId, RuleLookupTableBuilder};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingInjector {
        events: Mutex<Vec<(InternalCode, EventType)>>,
    }

    impl SequenceInjector for RecordingInjector {
        fn inject(&self, code: InternalCode, event: EventType) {
            self.events.lock().unwrap().push((code, event));
        }
    }

    fn resolver_with_two_keymaps() -> FocusResolver {
        let mut arena = KeymapArena::new();
        let child = arena.insert(Keymap::new("child", FocusPredicate::any(), RuleLookupTableBuilder::new().build()));
        let parent = arena.insert(Keymap::new("parent", FocusPredicate::any(), RuleLookupTableBuilder::new().build()));
        // re-insert child with parent link since arena is append-only and ids are assigned by position
        let mut arena2 = KeymapArena::new();
        let parent_id = arena2.insert(Keymap::new("parent", FocusPredicate::any(), RuleLookupTableBuilder::new().build()));
        let child_id = arena2.insert(Keymap::new("child", FocusPredicate::any(), RuleLookupTableBuilder::new().build()).with_parent(parent_id));
        let _ = (arena, child, parent);
        FocusResolver::new(arena2, child_id)
    }

    #[test]
    fn key_sequence_action_injects_in_order() {
        let mut modifier_state = ModifierState::new();
        let mut prefix_stack = PrefixStack::new();
        let resolver = resolver_with_two_keymaps();
        let mut variables = HashMap::new();
        let injector = RecordingInjector::default();
        let host = NoopExternalActionHost;
        let mut ctx = ExecutorContext {
            modifier_state: &mut modifier_state,
            prefix_stack: &mut prefix_stack,
            resolver: &resolver,
            variables: &mut variables,
            injector: &injector,
            external_host: &host,
        };
        let action = ActionKind::KeySequence(vec![(30, EventType::Press), (30, EventType::Release)]);
        dispatch(&action, &mut ctx);
        assert_eq!(
            *injector.events.lock().unwrap(),
            vec![(30, EventType::Press), (30, EventType::Release)]
        );
    }

    #[test]
    fn toggle_lock_flips_bit() {
        let mut modifier_state = ModifierState::new();
        let mut prefix_stack = PrefixStack::new();
        let resolver = resolver_with_two_keymaps();
        let mut variables = HashMap::new();
        let injector = RecordingInjector::default();
        let host = NoopExternalActionHost;
        let mut ctx = ExecutorContext {
            modifier_state: &mut modifier_state,
            prefix_stack: &mut prefix_stack,
            resolver: &resolver,
            variables: &mut variables,
            injector: &injector,
            external_host: &host,
        };
        dispatch(&ActionKind::ToggleLock(5), &mut ctx);
        assert!(ctx.modifier_state.is_locked(5));
    }

    #[test]
    fn prefix_parent_pops_to_parent_keymap() {
        let mut modifier_state = ModifierState::new();
        let mut prefix_stack = PrefixStack::new();
        let resolver = resolver_with_two_keymaps();
        let arena = resolver.load_arena();
        let child_id = KeymapId(1);
        let parent_id = arena.get(child_id).unwrap().parent.unwrap();
        drop(arena);
        let mut variables = HashMap::new();
        let injector = RecordingInjector::default();
        let host = NoopExternalActionHost;
        let mut ctx = ExecutorContext {
            modifier_state: &mut modifier_state,
            prefix_stack: &mut prefix_stack,
            resolver: &resolver,
            variables: &mut variables,
            injector: &injector,
            external_host: &host,
        };
        ctx.prefix_stack.push(child_id);
        dispatch(&ActionKind::PrefixParent, &mut ctx);
        assert_eq!(ctx.prefix_stack.top(), Some(parent_id));
    }

    #[test]
    fn repeat_clamps_count_and_replays_sequence() {
        let mut modifier_state = ModifierState::new();
        let mut prefix_stack = PrefixStack::new();
        let resolver = resolver_with_two_keymaps();
        let mut variables = HashMap::new();
        variables.insert("n".to_string(), 3);
        let injector = RecordingInjector::default();
        let host = NoopExternalActionHost;
        let mut ctx = ExecutorContext {
            modifier_state: &mut modifier_state,
            prefix_stack: &mut prefix_stack,
            resolver: &resolver,
            variables: &mut variables,
            injector: &injector,
            external_host: &host,
        };
        let action = ActionKind::Repeat {
            sequence: vec![(44, EventType::Press)],
            count_var: "n".to_string(),
        };
        dispatch(&action, &mut ctx);
        assert_eq!(injector.events.lock().unwrap().len(), 3);
    }

    #[test]
    fn variable_mutate_increments_and_resets() {
        let mut modifier_state = ModifierState::new();
        let mut prefix_stack = PrefixStack::new();
        let resolver = resolver_with_two_keymaps();
        let mut variables = HashMap::new();
        let injector = RecordingInjector::default();
        let host = NoopExternalActionHost;
        let mut ctx = ExecutorContext {
            modifier_state: &mut modifier_state,
            prefix_stack: &mut prefix_stack,
            resolver: &resolver,
            variables: &mut variables,
            injector: &injector,
            external_host: &host,
        };
        dispatch(&ActionKind::VariableMutate { name: "n".into(), op: VariableOp::Increment(5) }, &mut ctx);
        dispatch(&ActionKind::VariableMutate { name: "n".into(), op: VariableOp::Increment(5) }, &mut ctx);
        assert_eq!(ctx.variables["n"], 10);
        dispatch(&ActionKind::VariableMutate { name: "n".into(), op: VariableOp::Reset }, &mut ctx);
        assert_eq!(ctx.variables["n"], 0);
    }

    #[test]
    fn executor_worker_drains_until_sender_dropped() {
        let (executor, receiver) = ActionExecutor::new(8);
        let processed = Arc::new(AtomicUsize::new(0));
        let processed2 = processed.clone();
        let handle = ActionExecutor::spawn_worker(receiver, move |_msg| {
            processed2.fetch_add(1, Ordering::SeqCst);
        })
        .expect("thread spawn should succeed in test");

        let actions: Arc<[ActionKind]> = Arc::from(vec![ActionKind::Help]);
        for _ in 0..4 {
            assert!(executor.try_enqueue(QueuedAction { actions: actions.clone(), handle: ActionHandle(0) }));
        }
        drop(executor);
        handle.join().unwrap();
        assert_eq!(processed.load(Ordering::SeqCst), 4);
    }
}
