//! Modifier state tracking (§4.B) and the hold/tap trigger state machine (§4.D).

pub mod bitset;
pub mod state;
pub mod trigger;

pub use bitset::{ModifierBitset, StdModifier, LOCK_COUNT, STD_MOD_COUNT, TOTAL_BITS, VIRTUAL_MOD_COUNT};
pub use state::{LockChangeCallback, ModifierState};
pub use trigger::{
    ModifierKeyHandler, TriggerAction, TriggerRegistration, TriggerState, DEFAULT_THRESHOLD_MS,
    T_MAX_DEFAULT_MS,
};
