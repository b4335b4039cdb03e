//! Modifier State (§4.B): standard + virtual + lock bit tracking with a
//! linearizable snapshot accessor and a lock-change notification callback.

use crate::bitset::{ModifierBitset, StdModifier};
use core_keycode::{evdev, InternalCode};
use std::sync::Arc;

/// Callback invoked whenever a lock bit changes, carrying the packed lock vector (§4.B, §3).
pub type LockChangeCallback = Arc<dyn Fn(&[u32; 8]) + Send + Sync>;

#[derive(Default)]
pub struct ModifierState {
    bits: ModifierBitset,
    on_lock_change: Option<LockChangeCallback>,
}

impl ModifierState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lock_change_callback(&mut self, callback: LockChangeCallback) {
        self.on_lock_change = Some(callback);
    }

    /// If `code` is a standard hardware modifier, set/clear the corresponding flag and return
    /// `true`; otherwise return `false` and leave the state untouched. Press of an already-
    /// pressed standard modifier (and release of an unpressed one) is idempotent by
    /// construction: setting a bit to the value it already has is a no-op.
    ///
    /// `is_extended` is accepted for contract parity with platforms whose raw scan codes share a
    /// single value between a key's left/right variants (disambiguated only by an extended-key
    /// flag); this engine's `core-keycode` table already assigns left/right hardware modifiers
    /// distinct internal codes, so `is_extended` is currently unconsulted.
    pub fn update_from_event(
        &mut self,
        code: InternalCode,
        is_press: bool,
        _is_extended: bool,
    ) -> bool {
        let flag = match code {
            x if x == evdev::KEY_LEFTSHIFT => StdModifier::LShift,
            x if x == evdev::KEY_RIGHTSHIFT => StdModifier::RShift,
            x if x == evdev::KEY_LEFTCTRL => StdModifier::LCtrl,
            x if x == evdev::KEY_RIGHTCTRL => StdModifier::RCtrl,
            x if x == evdev::KEY_LEFTALT => StdModifier::LAlt,
            x if x == evdev::KEY_RIGHTALT => StdModifier::RAlt,
            x if x == evdev::KEY_LEFTMETA => StdModifier::LWin,
            x if x == evdev::KEY_RIGHTMETA => StdModifier::RWin,
            x if x == evdev::KEY_CAPSLOCK => StdModifier::CapsLock,
            x if x == evdev::KEY_NUMLOCK => StdModifier::NumLock,
            x if x == evdev::KEY_SCROLLLOCK => StdModifier::ScrollLock,
            _ => return false,
        };
        self.bits.set_std(flag, is_press);
        true
    }

    pub fn activate(&mut self, mod_num: u8) {
        self.bits.set_virtual(mod_num, true);
    }

    pub fn deactivate(&mut self, mod_num: u8) {
        self.bits.set_virtual(mod_num, false);
    }

    pub fn is_active(&self, mod_num: u8) -> bool {
        self.bits.is_virtual_active(mod_num)
    }

    /// Toggle a lock bit and fire the notification callback (if any) with the packed lock
    /// vector. The bit flip and the notification happen while the caller still holds the engine
    /// critical section (§5), so the callback always observes a state consistent with the flip.
    pub fn toggle_lock(&mut self, lock_num: u8) {
        self.bits.toggle_lock(lock_num);
        self.notify_locks();
    }

    pub fn is_locked(&self, lock_num: u8) -> bool {
        self.bits.is_lock_active(lock_num)
    }

    pub fn full_state(&self) -> ModifierBitset {
        self.bits.clone()
    }

    /// Clear all bits and fire a lock-change notification with an all-zero vector (§4.B).
    pub fn reset(&mut self) {
        self.bits.clear();
        self.notify_locks();
    }

    fn notify_locks(&self) {
        if let Some(cb) = &self.on_lock_change {
            cb(&self.bits.lock_vector());
        }
    }
}
