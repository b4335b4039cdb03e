//! Keycode Mapper (§4.A): bidirectional OS↔internal scan code translation.
//!
//! Two static, pre-built dense dictionaries (`evdev -> internal` and
//! `internal -> evdev`) are constructed once from a const table and cached in
//! `OnceLock`s. Lookups are total functions that return `0` for unmapped
//! inputs — the sentinel the rest of the pipeline treats as "drop".
//!
//! The internal scan code space reserves `0xF000..=0xF0FF` for virtual-
//! modifier trigger pseudo-codes (M00..MFF, §3); this crate's table never
//! emits or accepts a code in that range, since those codes are synthesized
//! by `core-modifier`, not decoded from hardware.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Canonical, platform-independent key identifier (§3).
pub type InternalCode = u16;

/// First internal code reserved for virtual-modifier trigger pseudo-codes.
pub const VIRTUAL_MODIFIER_BASE: InternalCode = 0xF000;
/// Last internal code reserved for virtual-modifier trigger pseudo-codes.
pub const VIRTUAL_MODIFIER_MAX: InternalCode = 0xF0FF;

pub fn is_virtual_modifier_code(code: InternalCode) -> bool {
    (VIRTUAL_MODIFIER_BASE..=VIRTUAL_MODIFIER_MAX).contains(&code)
}

/// `evdev` codes for the standard hardware modifiers, taken from
/// `linux/input-event-codes.h`. Exposed so `core-modifier` can classify a
/// decoded internal code as a standard modifier without duplicating the
/// Linux constants.
pub mod evdev {
    pub const KEY_LEFTSHIFT: u16 = 42;
    pub const KEY_RIGHTSHIFT: u16 = 54;
    pub const KEY_LEFTCTRL: u16 = 29;
    pub const KEY_RIGHTCTRL: u16 = 97;
    pub const KEY_LEFTALT: u16 = 56;
    pub const KEY_RIGHTALT: u16 = 100;
    pub const KEY_LEFTMETA: u16 = 125;
    pub const KEY_RIGHTMETA: u16 = 126;
    pub const KEY_CAPSLOCK: u16 = 58;
    pub const KEY_NUMLOCK: u16 = 69;
    pub const KEY_SCROLLLOCK: u16 = 70;
}

/// A single `(evdev, internal)` correspondence. For this reimplementation the
/// internal code space reuses the `evdev` numbering for every hardware key
/// (the original engine's own "yamy scan code" table does the same for the
/// bulk of the keyboard, diverging only for a handful of legacy PC/AT codes
/// not relevant to evdev input) — the table still goes through an explicit
/// dictionary build rather than an identity function so a future divergent
/// internal numbering is a table edit, not a pipeline change.
const TABLE: &[(u16, InternalCode)] = &[
    (1, 1),     // KEY_ESC
    (2, 2),     // KEY_1
    (3, 3),     // KEY_2
    (4, 4),     // KEY_3
    (5, 5),     // KEY_4
    (6, 6),     // KEY_5
    (7, 7),     // KEY_6
    (8, 8),     // KEY_7
    (9, 9),     // KEY_8
    (10, 10),   // KEY_9
    (11, 11),   // KEY_0
    (12, 12),   // KEY_MINUS
    (13, 13),   // KEY_EQUAL
    (14, 14),   // KEY_BACKSPACE
    (15, 15),   // KEY_TAB
    (16, 16),   // KEY_Q
    (17, 17),   // KEY_W
    (18, 18),   // KEY_E
    (19, 19),   // KEY_R
    (20, 20),   // KEY_T
    (21, 21),   // KEY_Y
    (22, 22),   // KEY_U
    (23, 23),   // KEY_I
    (24, 24),   // KEY_O
    (25, 25),   // KEY_P
    (26, 26),   // KEY_LEFTBRACE
    (27, 27),   // KEY_RIGHTBRACE
    (28, 28),   // KEY_ENTER
    (evdev::KEY_LEFTCTRL, evdev::KEY_LEFTCTRL),
    (30, 30), // KEY_A
    (31, 31), // KEY_S
    (32, 32), // KEY_D
    (33, 33), // KEY_F
    (34, 34), // KEY_G
    (35, 35), // KEY_H
    (36, 36), // KEY_J
    (37, 37), // KEY_K
    (38, 38), // KEY_L
    (39, 39), // KEY_SEMICOLON
    (40, 40), // KEY_APOSTROPHE
    (41, 41), // KEY_GRAVE
    (evdev::KEY_LEFTSHIFT, evdev::KEY_LEFTSHIFT),
    (43, 43), // KEY_BACKSLASH
    (44, 44), // KEY_Z
    (45, 45), // KEY_X
    (46, 46), // KEY_C
    (47, 47), // KEY_V
    (48, 48), // KEY_B
    (49, 49), // KEY_N
    (50, 50), // KEY_M
    (51, 51), // KEY_COMMA
    (52, 52), // KEY_DOT
    (53, 53), // KEY_SLASH
    (evdev::KEY_RIGHTSHIFT, evdev::KEY_RIGHTSHIFT),
    (evdev::KEY_LEFTALT, evdev::KEY_LEFTALT),
    (57, 57), // KEY_SPACE
    (evdev::KEY_CAPSLOCK, evdev::KEY_CAPSLOCK),
    (59, 59), // KEY_F1
    (60, 60), // KEY_F2
    (61, 61), // KEY_F3
    (62, 62), // KEY_F4
    (63, 63), // KEY_F5
    (64, 64), // KEY_F6
    (65, 65), // KEY_F7
    (66, 66), // KEY_F8
    (67, 67), // KEY_F9
    (68, 68), // KEY_F10
    (evdev::KEY_NUMLOCK, evdev::KEY_NUMLOCK),
    (evdev::KEY_SCROLLLOCK, evdev::KEY_SCROLLLOCK),
    (87, 87), // KEY_F11
    (88, 88), // KEY_F12
    (evdev::KEY_RIGHTCTRL, evdev::KEY_RIGHTCTRL),
    (evdev::KEY_RIGHTALT, evdev::KEY_RIGHTALT),
    (102, 102), // KEY_HOME
    (103, 103), // KEY_UP
    (104, 104), // KEY_PAGEUP
    (105, 105), // KEY_LEFT
    (106, 106), // KEY_RIGHT
    (107, 107), // KEY_END
    (108, 108), // KEY_DOWN
    (109, 109), // KEY_PAGEDOWN
    (110, 110), // KEY_INSERT
    (111, 111), // KEY_DELETE
    (evdev::KEY_LEFTMETA, evdev::KEY_LEFTMETA),
    (evdev::KEY_RIGHTMETA, evdev::KEY_RIGHTMETA),
    (139, 139), // KEY_MENU
];

struct KeycodeMaps {
    evdev_to_internal: HashMap<u16, InternalCode>,
    internal_to_evdev: HashMap<InternalCode, u16>,
}

fn maps() -> &'static KeycodeMaps {
    static MAPS: OnceLock<KeycodeMaps> = OnceLock::new();
    MAPS.get_or_init(|| {
        let mut evdev_to_internal = HashMap::with_capacity(TABLE.len());
        let mut internal_to_evdev = HashMap::with_capacity(TABLE.len());
        for &(ev, internal) in TABLE {
            evdev_to_internal.insert(ev, internal);
            internal_to_evdev.insert(internal, ev);
        }
        KeycodeMaps {
            evdev_to_internal,
            internal_to_evdev,
        }
    })
}

/// Translate an evdev code to its internal representation. Returns `0` for an
/// unmapped code; the caller treats `0` as "drop" and logs at trace level.
pub fn evdev_to_internal(evdev_code: u16) -> InternalCode {
    match maps().evdev_to_internal.get(&evdev_code).copied() {
        Some(code) => code,
        None => {
            tracing::trace!(target: "keycode", evdev_code, "decode_miss");
            0
        }
    }
}

/// Translate an internal code back to its evdev representation. Returns `0`
/// for an unmapped code.
pub fn internal_to_evdev(internal: InternalCode) -> u16 {
    match maps().internal_to_evdev.get(&internal).copied() {
        Some(code) => code,
        None => {
            tracing::trace!(target: "keycode", internal, "encode_miss");
            0
        }
    }
}

/// Whether an internal code identifies a standard hardware modifier key
/// (Shift/Ctrl/Alt/Win/Caps/Num/Scroll — §3).
pub fn is_hardware_modifier(internal: InternalCode) -> bool {
    matches!(
        internal,
        x if x == evdev::KEY_LEFTSHIFT
            || x == evdev::KEY_RIGHTSHIFT
            || x == evdev::KEY_LEFTCTRL
            || x == evdev::KEY_RIGHTCTRL
            || x == evdev::KEY_LEFTALT
            || x == evdev::KEY_RIGHTALT
            || x == evdev::KEY_LEFTMETA
            || x == evdev::KEY_RIGHTMETA
            || x == evdev::KEY_CAPSLOCK
            || x == evdev::KEY_NUMLOCK
            || x == evdev::KEY_SCROLLLOCK
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trip_every_supported_code() {
        for &(ev, internal) in TABLE {
            assert_eq!(internal_to_evdev(evdev_to_internal(ev)), ev);
            assert_eq!(evdev_to_internal(internal_to_evdev(internal)), internal);
        }
    }

    #[test]
    fn unmapped_code_returns_sentinel() {
        assert_eq!(evdev_to_internal(0xBEEF), 0);
        assert_eq!(internal_to_evdev(0xBEEF), 0);
    }

    #[test]
    fn hardware_modifiers_classified_correctly() {
        assert!(is_hardware_modifier(evdev::KEY_LEFTSHIFT));
        assert!(is_hardware_modifier(evdev::KEY_CAPSLOCK));
        assert!(!is_hardware_modifier(30)); // KEY_A
    }

    #[test]
    fn virtual_modifier_range_is_excluded_from_table() {
        for &(_, internal) in TABLE {
            assert!(!is_virtual_modifier_code(internal));
        }
        assert!(is_virtual_modifier_code(0xF000));
        assert!(is_virtual_modifier_code(0xF0FF));
        assert!(!is_virtual_modifier_code(0xEFFF));
        assert!(!is_virtual_modifier_code(0xF100));
    }
}
