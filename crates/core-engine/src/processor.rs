//! Event Processor (§4.E): the three-layer pipeline orchestrator and the engine's single hot-path
//! entry point, `EventProcessor::process`.
//!
//! Processing order is load-bearing and MUST NOT be reordered (§4.E): pre-tick `poll_waiting`,
//! decode, classify/substitute (trigger handling, standard-modifier tracking, rule lookup),
//! encode. The whole call executes under the engine's critical section (§5: "a small,
//! hot-path-only mutex protecting modifier state + current lookup table pointer") and performs no
//! I/O and no heap allocation beyond what `ActionKind` cloning for the queue requires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use core_actions::{ActionKind, QueuedAction};
use core_events::EventType;
use core_keycode::InternalCode;
use core_keymap::{FocusResolver, PrefixStack};
use core_modifier::{ModifierKeyHandler, ModifierState};
use parking_lot::Mutex;

use crate::journey::{JourneyGate, JourneyRecord};
use crate::metrics::LatencyRingBuffer;

/// Outcome of one `EventProcessor::process` call (§4.E). `valid == false` means the OS adapter
/// must not inject anything: a decode/encode miss, a fully-suppressed trigger event, or a
/// dropped action-queue overflow all collapse to this rather than a distinct error type, per §7's
/// "the hot path NEVER raises out of §4.E".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessedEvent {
    pub output_evdev: u16,
    pub output_internal: InternalCode,
    pub kind: EventType,
    pub valid: bool,
    pub is_tap: bool,
}

impl ProcessedEvent {
    fn invalid(kind: EventType) -> Self {
        Self {
            output_evdev: 0,
            output_internal: 0,
            kind,
            valid: false,
            is_tap: false,
        }
    }
}

/// State mutated exclusively on the hot path, grouped so one `parking_lot::Mutex` covers all of
/// it (§5, §9: split critical section — modifier state + trigger machines + prefix stack here;
/// the rule lookup table is published separately via the resolver's lock-free `ArcSwap`).
struct EngineState {
    modifier_state: ModifierState,
    handler: ModifierKeyHandler,
    prefix_stack: PrefixStack,
}

/// Counts actions dropped because the background executor's channel was full (§5 backpressure:
/// "further failures surface as a logged drop and increment a metrics counter").
pub static ACTION_QUEUE_DROPS: AtomicU64 = AtomicU64::new(0);
/// Counts Layer 1/3 decode or encode misses (§7 `decode_miss`).
pub static DECODE_MISSES: AtomicU64 = AtomicU64::new(0);

pub struct EventProcessor {
    resolver: Arc<FocusResolver>,
    actions: ArcSwap<Arc<[ActionKind]>>,
    action_sender: Option<crossbeam_channel::Sender<QueuedAction>>,
    state: Mutex<EngineState>,
    journey: JourneyGate,
    metrics: Arc<LatencyRingBuffer>,
}

impl EventProcessor {
    pub fn new(resolver: Arc<FocusResolver>, handler: ModifierKeyHandler) -> Self {
        Self {
            resolver,
            actions: ArcSwap::from_pointee(Arc::from(Vec::<ActionKind>::new())),
            action_sender: None,
            state: Mutex::new(EngineState {
                modifier_state: ModifierState::new(),
                handler,
                prefix_stack: PrefixStack::new(),
            }),
            journey: JourneyGate::default(),
            metrics: Arc::new(LatencyRingBuffer::new()),
        }
    }

    pub fn with_action_sender(mut self, sender: crossbeam_channel::Sender<QueuedAction>) -> Self {
        self.action_sender = Some(sender);
        self
    }

    pub fn with_journey(mut self, journey: JourneyGate) -> Self {
        self.journey = journey;
        self
    }

    pub fn metrics(&self) -> &Arc<LatencyRingBuffer> {
        &self.metrics
    }

    pub fn journey(&self) -> &JourneyGate {
        &self.journey
    }

    pub fn resolver(&self) -> &Arc<FocusResolver> {
        &self.resolver
    }

    /// Borrow the engine's modifier state and prefix stack for the duration of `f`, under the same
    /// critical section `process` itself uses (§5). The background action executor uses this to
    /// build a `core_actions::ExecutorContext` so a dispatched `ToggleLock`/`PrefixPush` mutates
    /// the one authoritative state the hot path reads, rather than a second copy.
    pub fn with_state_locked<R>(&self, f: impl FnOnce(&mut ModifierState, &mut PrefixStack) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state.modifier_state, &mut state.prefix_stack)
    }

    /// Install a fresh action table (§6 `install_config`), published atomically with the
    /// resolver's own rule-table swap so a matched `ActionHandle` always resolves against the
    /// same configuration generation that produced it.
    pub fn install_actions(&self, actions: Arc<[ActionKind]>) {
        self.actions.store(Arc::new(actions));
    }

    /// Clears all modifier/lock state and every trigger back to IDLE (§3: "any modifier left
    /// 'down' at reload is cleared"). Called by the daemon immediately after a successful
    /// `install_config`/`install_arena`.
    pub fn reset_modifier_state(&self) {
        self.state.lock().modifier_state.reset();
    }

    /// Re-apply a persisted lock-bit set at startup (§6 "Persisted state"), before the hot-path
    /// thread starts calling `process`. Locks not already held are toggled on; already-held locks
    /// (there should be none, right after construction) are left alone.
    pub fn seed_locks(&self, locks: &[u8]) {
        let mut state = self.state.lock();
        for &lock_num in locks {
            if !state.modifier_state.is_locked(lock_num) {
                state.modifier_state.toggle_lock(lock_num);
            }
        }
    }

    /// Snapshot every currently-held lock number, for `core_config::persist_locks` at shutdown.
    pub fn active_locks(&self) -> Vec<u8> {
        let state = self.state.lock();
        (0..=u8::MAX)
            .filter(|&l| state.modifier_state.is_locked(l))
            .collect()
    }

    /// The three-layer pipeline (§4.E). `now_ns` is the event's own timestamp (used for trigger
    /// threshold math, §4.D); processing latency for metrics/journey is measured internally via
    /// wall-clock `Instant`, independent of the event's own timestamp.
    pub fn process(&self, device_id: u32, input_evdev: u16, event_type: EventType, now_ns: u64) -> ProcessedEvent {
        let started = Instant::now();
        let is_press = matches!(event_type, EventType::Press);
        let mut state = self.state.lock();

        // Step 1 — pre-tick: promote any trigger that crossed its threshold since the last
        // event, so a long hold activates before *this* event is classified (§4.E, §5).
        for (_, mod_num) in state.handler.poll_waiting(now_ns) {
            state.modifier_state.activate(mod_num);
        }

        // Layer 1 — decode.
        let internal_in = core_keycode::evdev_to_internal(input_evdev);
        if internal_in == 0 {
            DECODE_MISSES.fetch_add(1, Ordering::Relaxed);
            drop(state);
            self.record(device_id, input_evdev, 0, 0, event_type, false, false, started);
            return ProcessedEvent::invalid(event_type);
        }

        let mut was_trigger = false;
        let mut was_substituted = false;
        let mut output_internal = internal_in;
        let mut is_tap = false;
        let mut suppressed = false;
        let mut matched_action: Option<(Arc<[ActionKind]>, core_keymap::ActionHandle)> = None;

        // Layer 2 — classify & substitute.
        if state.handler.is_trigger(internal_in) {
            was_trigger = true;
            let action = state
                .handler
                .handle(internal_in, is_press, now_ns)
                .expect("is_trigger confirmed a registration exists");
            match action {
                core_modifier::TriggerAction::WaitingForThreshold => {
                    suppressed = true;
                }
                core_modifier::TriggerAction::Activate { mod_num } => {
                    state.modifier_state.activate(mod_num);
                    suppressed = true;
                }
                core_modifier::TriggerAction::Deactivate { mod_num } => {
                    state.modifier_state.deactivate(mod_num);
                    suppressed = true;
                }
                core_modifier::TriggerAction::ApplySubstitutionRelease { tap_output } => {
                    is_tap = true;
                    was_substituted = true;
                    output_internal = tap_output;
                }
                core_modifier::TriggerAction::NotAModifier => {
                    // Falls through to normal-key handling below, using `internal_in` as-is.
                }
                core_modifier::TriggerAction::Suppress => {
                    suppressed = true;
                }
            }
        }

        if !suppressed && !is_tap {
            // 2b — standard hardware modifiers still update state AND continue to rule lookup /
            // passthrough below, since Layer 3 forwards them to the OS (§4.E).
            state
                .modifier_state
                .update_from_event(internal_in, is_press, false);

            // 2c — rule lookup against the effective keymap (prefix stack, else focus selection),
            // walking the keymap's ancestry so a child keymap inherits its parent's rules.
            let arena = self.resolver.load_arena();
            let effective = self.resolver.effective_keymap(&state.prefix_stack);
            let snapshot = state.modifier_state.full_state();
            let mut matched = None;
            for keymap_id in arena.ancestry(effective) {
                if let Some(keymap) = arena.get(keymap_id) {
                    if let Some(rule) = keymap.rules.find_match(internal_in, &snapshot) {
                        matched = Some((rule.output_code, rule.action));
                        break;
                    }
                }
            }
            match matched {
                Some((output_code, action)) => {
                    if output_code != internal_in {
                        was_substituted = true;
                    }
                    output_internal = output_code;
                    if let Some(handle) = action {
                        matched_action = Some((self.actions.load_full().as_ref().clone(), handle));
                    }
                }
                None => {
                    output_internal = internal_in;
                }
            }
        }

        drop(state);

        if let Some((actions, handle)) = matched_action {
            self.enqueue_action(actions, handle);
        }

        if suppressed {
            let processed = ProcessedEvent::invalid(event_type);
            self.record(device_id, input_evdev, internal_in, 0, event_type, was_substituted, was_trigger, started);
            return processed;
        }

        // Layer 3 — encode.
        let output_evdev = core_keycode::internal_to_evdev(output_internal);
        if output_evdev == 0 {
            DECODE_MISSES.fetch_add(1, Ordering::Relaxed);
            self.record(device_id, input_evdev, internal_in, output_internal, event_type, was_substituted, was_trigger, started);
            return ProcessedEvent::invalid(event_type);
        }

        let processed = ProcessedEvent {
            output_evdev,
            output_internal,
            kind: event_type,
            valid: true,
            is_tap,
        };
        self.record(device_id, input_evdev, internal_in, output_internal, event_type, was_substituted, was_trigger, started);
        processed
    }

    fn enqueue_action(&self, actions: Arc<[ActionKind]>, handle: core_keymap::ActionHandle) {
        let Some(sender) = &self.action_sender else {
            return;
        };
        let queued = QueuedAction { actions, handle };
        if sender.try_send(queued).is_err() {
            ACTION_QUEUE_DROPS.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(target: "core_engine.processor", "action queue full, dropping matched action");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        device_id: u32,
        input_evdev: u16,
        internal_in: InternalCode,
        internal_out: InternalCode,
        event_type: EventType,
        was_substituted: bool,
        was_trigger: bool,
        started: Instant,
    ) {
        let latency_ns = started.elapsed().as_nanos() as u64;
        self.metrics.record(latency_ns);
        if self.journey.is_enabled() {
            self.journey.emit(JourneyRecord {
                device_id,
                input_evdev,
                internal_in,
                internal_out,
                output_evdev: core_keycode::internal_to_evdev(internal_out),
                event_type,
                was_substituted,
                was_trigger,
                latency_ns,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_keymap::{ActionHandle, CompiledRule, FocusPredicate, Keymap, KeymapArena, RuleLookupTableBuilder};
    use core_modifier::{ModifierBitset, StdModifier, TriggerRegistration};

    fn processor_with(arena: KeymapArena, default: core_keymap::KeymapId) -> EventProcessor {
        let resolver = Arc::new(FocusResolver::new(arena, default));
        EventProcessor::new(resolver, ModifierKeyHandler::new())
    }

    /// Scenario 1: trivial passthrough with no rules and no triggers.
    #[test]
    fn trivial_passthrough() {
        let mut arena = KeymapArena::new();
        let global = arena.insert(Keymap::new("global", FocusPredicate::any(), RuleLookupTableBuilder::new().build()));
        let processor = processor_with(arena, global);

        let out = processor.process(0, 30, EventType::Press, 0);
        assert!(out.valid);
        assert_eq!(out.output_evdev, 30);
        assert_eq!(out.kind, EventType::Press);
    }

    /// Scenario 2: a single unconditional remap, W (17) -> A (30).
    #[test]
    fn simple_remap() {
        let mut builder = RuleLookupTableBuilder::new();
        builder.add_rule(17, CompiledRule::new(ModifierBitset::new(), ModifierBitset::new(), 30));
        let mut arena = KeymapArena::new();
        let global = arena.insert(Keymap::new("global", FocusPredicate::any(), builder.build()));
        let processor = processor_with(arena, global);

        let out = processor.process(0, 17, EventType::Press, 0);
        assert!(out.valid);
        assert_eq!(out.output_evdev, 30);
    }

    /// Scenario 3/5: CapsLock held past threshold activates M00, which gates an H -> Left rule;
    /// releasing CapsLock afterward deactivates M00 and H passes through again.
    #[test]
    fn hold_to_modifier_then_deactivate() {
        let mut required_on = ModifierBitset::new();
        required_on.set_virtual(0, true);
        let mut builder = RuleLookupTableBuilder::new();
        builder.add_rule(35 /* H */, CompiledRule::new(required_on, ModifierBitset::new(), 105 /* KEY_LEFT */));
        let mut arena = KeymapArena::new();
        let global = arena.insert(Keymap::new("global", FocusPredicate::any(), builder.build()));
        let mut handler = ModifierKeyHandler::new();
        handler.register(TriggerRegistration::new(58 /* CapsLock */, 0).with_tap_output(1 /* ESC */));
        let resolver = Arc::new(FocusResolver::new(arena, global));
        let processor = EventProcessor::new(resolver, handler);

        let caps_press = processor.process(0, 58, EventType::Press, 0);
        assert!(!caps_press.valid, "CapsLock press is suppressed while waiting");

        let h_while_held = processor.process(0, 35, EventType::Press, 250_000_000);
        assert!(h_while_held.valid);
        assert_eq!(h_while_held.output_evdev, 105, "H maps to Left once M00 is active");

        let caps_release = processor.process(0, 58, EventType::Release, 260_000_000);
        assert!(!caps_release.valid, "CapsLock release is suppressed, consumed by Deactivate");

        let h_after_release = processor.process(0, 35, EventType::Press, 300_000_000);
        assert_eq!(h_after_release.output_evdev, 35, "H passes through once M00 is cleared");
    }

    /// Scenario 4: a quick CapsLock tap expands to ESC press+release; M00 never activates.
    #[test]
    fn tap_before_threshold_expands_to_esc() {
        let mut arena = KeymapArena::new();
        let global = arena.insert(Keymap::new("global", FocusPredicate::any(), RuleLookupTableBuilder::new().build()));
        let mut handler = ModifierKeyHandler::new();
        handler.register(TriggerRegistration::new(58, 0).with_tap_output(1));
        let resolver = Arc::new(FocusResolver::new(arena, global));
        let processor = EventProcessor::new(resolver, handler);

        processor.process(0, 58, EventType::Press, 0);
        let tap = processor.process(0, 58, EventType::Release, 50_000_000);
        assert!(tap.valid);
        assert!(tap.is_tap);
        assert_eq!(tap.output_evdev, 1);
    }

    /// Scenario 6: a rule scoped to one keymap does not leak into another keymap's lookup.
    #[test]
    fn focus_switch_scopes_rules_to_active_keymap() {
        let mut emacs_builder = RuleLookupTableBuilder::new();
        emacs_builder.add_rule(46 /* C */, CompiledRule::new(ModifierBitset::new(), ModifierBitset::new(), 45 /* X */));
        let mut arena = KeymapArena::new();
        let global = arena.insert(Keymap::new("global", FocusPredicate::any(), RuleLookupTableBuilder::new().build()));
        arena.insert(Keymap::new(
            "emacs",
            FocusPredicate {
                class_re: Some(regex::Regex::new("^Emacs$").unwrap()),
                title_re: None,
            },
            emacs_builder.build(),
        ));
        let resolver = Arc::new(FocusResolver::new(arena, global));
        let processor = EventProcessor::new(resolver.clone(), ModifierKeyHandler::new());

        resolver.notify_focus("Emacs", "scratch", false);
        let remapped = processor.process(0, 46, EventType::Press, 0);
        assert_eq!(remapped.output_evdev, 45);

        resolver.notify_focus("neutral-app", "", false);
        let passthrough = processor.process(0, 46, EventType::Press, 0);
        assert_eq!(passthrough.output_evdev, 46);
    }

    #[test]
    fn unknown_input_code_is_decode_miss() {
        let mut arena = KeymapArena::new();
        let global = arena.insert(Keymap::new("global", FocusPredicate::any(), RuleLookupTableBuilder::new().build()));
        let processor = processor_with(arena, global);
        let out = processor.process(0, 0xBEEF, EventType::Press, 0);
        assert!(!out.valid);
    }

    #[test]
    fn action_handle_on_matched_rule_is_queued_for_executor() {
        let mut builder = RuleLookupTableBuilder::new();
        builder.add_rule(
            30,
            CompiledRule::new(ModifierBitset::new(), ModifierBitset::new(), 30).with_action(ActionHandle(0)),
        );
        let mut arena = KeymapArena::new();
        let global = arena.insert(Keymap::new("global", FocusPredicate::any(), builder.build()));
        let resolver = Arc::new(FocusResolver::new(arena, global));
        let (tx, rx) = crossbeam_channel::unbounded();
        let processor = EventProcessor::new(resolver, ModifierKeyHandler::new()).with_action_sender(tx);
        processor.install_actions(std::sync::Arc::from(vec![ActionKind::Help]));

        processor.process(0, 30, EventType::Press, 0);
        let queued = rx.try_recv().expect("action should have been queued");
        assert_eq!(queued.resolve(), Some(&ActionKind::Help));
    }

    #[test]
    fn requires_lock_released_between_processing_and_enqueue_no_deadlock() {
        // Regression guard: enqueue happens after the state mutex is dropped.
        let mut arena = KeymapArena::new();
        let global = arena.insert(Keymap::new("global", FocusPredicate::any(), RuleLookupTableBuilder::new().build()));
        let processor = processor_with(arena, global);
        for _ in 0..1000 {
            processor.process(0, 30, EventType::Press, 0);
        }
    }

    #[test]
    fn std_modifier_key_still_reaches_rule_lookup_and_passthrough() {
        let mut arena = KeymapArena::new();
        let global = arena.insert(Keymap::new("global", FocusPredicate::any(), RuleLookupTableBuilder::new().build()));
        let processor = processor_with(arena, global);
        let out = processor.process(0, core_keycode::evdev::KEY_LEFTSHIFT, EventType::Press, 0);
        assert!(out.valid);
        assert_eq!(out.output_evdev, core_keycode::evdev::KEY_LEFTSHIFT);
    }

    #[test]
    fn specificity_tiebreak_reused_from_keymap_layer() {
        // Sanity: core-engine relies on core-keymap/core-config to pre-sort buckets; verify the
        // more specific rule (shift required) wins when both are present and shift is held.
        let mut builder = RuleLookupTableBuilder::new();
        let mut shift_on = ModifierBitset::new();
        shift_on.set_std(StdModifier::LShift, true);
        builder.add_rule(30, CompiledRule::new(shift_on, ModifierBitset::new(), 999));
        builder.add_rule(30, CompiledRule::new(ModifierBitset::new(), ModifierBitset::new(), 30));
        let mut arena = KeymapArena::new();
        let global = arena.insert(Keymap::new("global", FocusPredicate::any(), builder.build()));
        let processor = processor_with(arena, global);

        processor.process(0, core_keycode::evdev::KEY_LEFTSHIFT, EventType::Press, 0);
        let out = processor.process(0, 30, EventType::Press, 0);
        assert_eq!(out.output_evdev, 999);
    }
}
