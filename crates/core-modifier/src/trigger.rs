//! Modifier-Key Handler (§4.D): one hold/tap state machine per registered
//! trigger key. Threshold `T` defaults to 200 ms and is configurable per
//! registration; `T_MAX_DEFAULT` guards against a suspended/resumed clock
//! leaving a trigger stuck in WAITING forever.

use core_keycode::InternalCode;
use smallvec::SmallVec;
use std::collections::HashMap;

pub const DEFAULT_THRESHOLD_MS: u64 = 200;
pub const T_MAX_DEFAULT_MS: u64 = 5_000;

/// Steady/transient states of a single trigger (§3 data model). `TapDetected` is carried in the
/// enum for data-model fidelity but the transition table below never leaves a trigger resting
/// there: a tap always collapses straight back to `Idle` in the same `handle` call that detects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Waiting,
    ModifierActive,
    TapDetected,
}

/// Outcome of feeding one event to a trigger's state machine. The event processor (§4.E) branches
/// on this to decide what, if anything, reaches the OS adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// Fully suppressed: no OS event, waiting to see whether this becomes a hold or a tap.
    WaitingForThreshold,
    /// Activate the trigger's virtual modifier bit.
    Activate { mod_num: u8 },
    /// Clear the trigger's virtual modifier bit.
    Deactivate { mod_num: u8 },
    /// Hold expired before activation, or a repeat arrived after `T_MAX`: treat the physical key
    /// as an ordinary key rather than a modifier trigger.
    NotAModifier,
    /// Release arrived before `T`: synthesize a PRESS+RELEASE pair of `tap_output`.
    ApplySubstitutionRelease { tap_output: u16 },
    /// Event consumed with no externally visible effect (auto-repeat of an active trigger, or a
    /// spurious release).
    Suppress,
}

#[derive(Debug, Clone, Copy)]
pub struct TriggerRegistration {
    pub trigger_code: InternalCode,
    pub mod_num: u8,
    pub tap_output: Option<u16>,
    pub threshold_ms: u64,
}

impl TriggerRegistration {
    pub fn new(trigger_code: InternalCode, mod_num: u8) -> Self {
        Self {
            trigger_code,
            mod_num,
            tap_output: None,
            threshold_ms: DEFAULT_THRESHOLD_MS,
        }
    }

    pub fn with_tap_output(mut self, tap_output: u16) -> Self {
        self.tap_output = Some(tap_output);
        self
    }

    pub fn with_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.threshold_ms = threshold_ms;
        self
    }
}

struct TriggerEntry {
    reg: TriggerRegistration,
    state: TriggerState,
    press_time_ns: u64,
}

/// Holds one `TriggerEntry` per registered trigger key, keyed by internal code, and drives each
/// through the §4.D transition table.
#[derive(Default)]
pub struct ModifierKeyHandler {
    entries: HashMap<InternalCode, TriggerEntry>,
    t_max_ms: u64,
}

impl ModifierKeyHandler {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            t_max_ms: T_MAX_DEFAULT_MS,
        }
    }

    pub fn with_t_max_ms(mut self, t_max_ms: u64) -> Self {
        self.t_max_ms = t_max_ms;
        self
    }

    pub fn register(&mut self, reg: TriggerRegistration) {
        self.entries.insert(
            reg.trigger_code,
            TriggerEntry {
                reg,
                state: TriggerState::Idle,
                press_time_ns: 0,
            },
        );
    }

    pub fn is_trigger(&self, code: InternalCode) -> bool {
        self.entries.contains_key(&code)
    }

    /// Feed one (press/release, timestamp) event to `code`'s state machine. Returns `None` if
    /// `code` is not a registered trigger.
    pub fn handle(&mut self, code: InternalCode, is_press: bool, now_ns: u64) -> Option<TriggerAction> {
        let entry = self.entries.get_mut(&code)?;
        let threshold_ns = entry.reg.threshold_ms * 1_000_000;
        let t_max_ns = self.t_max_ms * 1_000_000;

        let action = match (entry.state, is_press) {
            (TriggerState::Idle, true) => {
                entry.press_time_ns = now_ns;
                entry.state = TriggerState::Waiting;
                TriggerAction::WaitingForThreshold
            }
            (TriggerState::Idle, false) => {
                tracing::warn!(target: "modifier_trigger", code, "spurious_release_in_idle");
                TriggerAction::Suppress
            }
            (TriggerState::Waiting, true) => {
                let elapsed = now_ns.saturating_sub(entry.press_time_ns);
                if elapsed < threshold_ns {
                    TriggerAction::WaitingForThreshold
                } else if elapsed <= t_max_ns {
                    entry.state = TriggerState::ModifierActive;
                    TriggerAction::Activate {
                        mod_num: entry.reg.mod_num,
                    }
                } else {
                    entry.state = TriggerState::Idle;
                    TriggerAction::NotAModifier
                }
            }
            (TriggerState::Waiting, false) => {
                let elapsed = now_ns.saturating_sub(entry.press_time_ns);
                entry.state = TriggerState::Idle;
                if elapsed < threshold_ns {
                    match entry.reg.tap_output {
                        Some(tap_output) => TriggerAction::ApplySubstitutionRelease { tap_output },
                        None => TriggerAction::Suppress,
                    }
                } else {
                    TriggerAction::Suppress
                }
            }
            (TriggerState::ModifierActive, false) => {
                entry.state = TriggerState::Idle;
                TriggerAction::Deactivate {
                    mod_num: entry.reg.mod_num,
                }
            }
            (TriggerState::ModifierActive, true) => TriggerAction::Suppress,
            (TriggerState::TapDetected, _) => {
                entry.state = TriggerState::Idle;
                TriggerAction::Suppress
            }
        };

        Some(action)
    }

    /// Scan every trigger in `Waiting`, promoting any whose elapsed time has reached its
    /// threshold to `ModifierActive`. Invoked at the top of every processed event (§4.E step 1)
    /// so a long-held trigger activates before the current event is classified.
    pub fn poll_waiting(&mut self, now_ns: u64) -> SmallVec<[(InternalCode, u8); 8]> {
        let mut promoted = SmallVec::new();
        for (code, entry) in self.entries.iter_mut() {
            if entry.state != TriggerState::Waiting {
                continue;
            }
            let threshold_ns = entry.reg.threshold_ms * 1_000_000;
            let elapsed = now_ns.saturating_sub(entry.press_time_ns);
            if elapsed >= threshold_ns {
                entry.state = TriggerState::ModifierActive;
                promoted.push((*code, entry.reg.mod_num));
            }
        }
        promoted
    }

    /// Current resting state of a trigger, for diagnostics and tests.
    pub fn state_of(&self, code: InternalCode) -> Option<TriggerState> {
        self.entries.get(&code).map(|e| e.state)
    }
}
