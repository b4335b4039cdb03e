//! Modifier bitset (§3): a fixed-width 528-bit vector partitioned into three
//! contiguous segments — standard modifiers, virtual modifiers (M00..MFF),
//! and lock modifiers (L00..LFF).

use bitvec::prelude::*;

pub const STD_MOD_COUNT: usize = 16;
pub const VIRTUAL_MOD_COUNT: usize = 256;
pub const LOCK_COUNT: usize = 256;

pub const STD_OFFSET: usize = 0;
pub const VIRTUAL_OFFSET: usize = STD_OFFSET + STD_MOD_COUNT;
pub const LOCK_OFFSET: usize = VIRTUAL_OFFSET + VIRTUAL_MOD_COUNT;
pub const TOTAL_BITS: usize = LOCK_OFFSET + LOCK_COUNT;

/// Index into the `[0, 16)` standard-modifier segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum StdModifier {
    LShift = 0,
    RShift,
    LCtrl,
    RCtrl,
    LAlt,
    RAlt,
    LWin,
    RWin,
    CapsLock,
    NumLock,
    ScrollLock,
    Up,
    Down,
    Repeat,
    IMELock,
    IMEComp,
}

/// A linearizable snapshot of the engine's modifier state (§3 invariant: "exactly one bitset is
/// the authoritative modifier state per engine instance; concurrent observers see a linearizable
/// snapshot"). Cloning a `ModifierBitset` is the only way an external reader observes state; the
/// engine critical section (§5) is what makes a given clone's view consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierBitset {
    bits: BitVec<u64, Lsb0>,
}

impl Default for ModifierBitset {
    fn default() -> Self {
        Self {
            bits: bitvec![u64, Lsb0; 0; TOTAL_BITS],
        }
    }
}

impl ModifierBitset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bits.fill(false);
    }

    /// Set or clear a standard-modifier bit. Public so `core-config` can build a rule's
    /// `required_on`/`required_off` bitsets directly from its schema; `ModifierState` is still
    /// the only caller that mutates the *authoritative* engine bitset with this.
    #[inline]
    pub fn set_std(&mut self, flag: StdModifier, value: bool) {
        self.bits.set(STD_OFFSET + flag as usize, value);
    }

    #[inline]
    pub fn std_flag(&self, flag: StdModifier) -> bool {
        self.bits[STD_OFFSET + flag as usize]
    }

    #[inline]
    pub fn set_virtual(&mut self, mod_num: u8, value: bool) {
        self.bits.set(VIRTUAL_OFFSET + mod_num as usize, value);
    }

    #[inline]
    pub fn is_virtual_active(&self, mod_num: u8) -> bool {
        self.bits[VIRTUAL_OFFSET + mod_num as usize]
    }

    /// Directly set (not toggle) a lock bit. Used by `core-config` to seed the bitset's initial
    /// lock state at startup/restore; the engine's own runtime mutation path is
    /// `ModifierState::toggle_lock`, which fires the lock-change callback.
    #[inline]
    pub fn set_lock(&mut self, lock_num: u8, value: bool) {
        self.bits.set(LOCK_OFFSET + lock_num as usize, value);
    }

    #[inline]
    pub(crate) fn toggle_lock(&mut self, lock_num: u8) -> bool {
        let idx = LOCK_OFFSET + lock_num as usize;
        let new_value = !self.bits[idx];
        self.bits.set(idx, new_value);
        new_value
    }

    #[inline]
    pub fn is_lock_active(&self, lock_num: u8) -> bool {
        self.bits[LOCK_OFFSET + lock_num as usize]
    }

    /// The 256-bit lock segment packed into 8 little-endian `u32` words, matching the wire
    /// format the original GUI notification callback used (`uint32_t lockBits[8]`).
    pub fn lock_vector(&self) -> [u32; 8] {
        let mut out = [0u32; 8];
        for (lock_num, word) in out.iter_mut().enumerate() {
            let base = LOCK_OFFSET + lock_num * 32;
            let mut packed = 0u32;
            for bit in 0..32 {
                if self.bits[base + bit] {
                    packed |= 1 << bit;
                }
            }
            *word = packed;
        }
        out
    }

    /// Test whether `self` satisfies a rule's `(requiredOn, requiredOff)` pair (§3): every bit
    /// set in `required_on` must be set here, and every bit set in `required_off` must be clear.
    pub fn satisfies(&self, required_on: &ModifierBitset, required_off: &ModifierBitset) -> bool {
        for ((state_bit, on_bit), off_bit) in self
            .bits
            .iter()
            .zip(required_on.bits.iter())
            .zip(required_off.bits.iter())
        {
            if *on_bit && !*state_bit {
                return false;
            }
            if *off_bit && *state_bit {
                return false;
            }
        }
        true
    }

    /// Number of bits set (used by `core-keymap` to rank rule specificity, §3/§4.C).
    pub fn popcount(&self) -> usize {
        self.bits.count_ones()
    }

    /// The union of `self` and `other`, used to compute `requiredOn ∪ requiredOff` for
    /// specificity comparison without mutating either operand.
    pub fn union(&self, other: &ModifierBitset) -> ModifierBitset {
        let mut out = self.clone();
        out.bits |= other.bits.clone();
        out
    }

}
