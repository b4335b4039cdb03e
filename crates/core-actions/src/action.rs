//! Action vocabulary (§4.G): tagged variants queued by a matched rule and
//! drained by a background worker. No virtual dispatch — the dispatcher
//! matches on the enum directly, mirroring the teacher's
//! match-on-an-enum dispatch shape rather than a `dyn Action` trait object.

use core_events::EventType;
use core_keycode::InternalCode;
use core_keymap::KeymapId;

/// Opaque description of a command handed to the OS adapter's external-action host. The core
/// never interprets these payloads; it only carries them (§4.G, §9 open question on
/// `Command_PlugIn`/`ShellExecute`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalOp {
    ShellExecute { command: String, args: Vec<String> },
    WindowManagement { op: String },
    ClipboardWrite { text: String },
    ImeToggle,
    PlugIn { name: String, args: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableOp {
    Set(i64),
    Increment(i64),
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Generate a scripted PRESS/RELEASE sequence via the OS injector.
    KeySequence(Vec<(InternalCode, EventType)>),
    /// Flip a lock bit (§4.B).
    ToggleLock(u8),
    /// Push a child keymap onto the per-thread prefix stack (§4.F).
    PrefixPush(KeymapId),
    /// Pop to the pushed keymap's parent.
    PrefixParent,
    /// Pop to the previously active prefix keymap.
    PrefixPrev,
    /// Clear the prefix stack back to the focus-selected keymap.
    PrefixCancel,
    /// Emit `sequence` `count` times, where `count` is read from a named variable slot at
    /// dispatch time.
    Repeat {
        sequence: Vec<(InternalCode, EventType)>,
        count_var: String,
    },
    VariableMutate {
        name: String,
        op: VariableOp,
    },
    Help,
    Notify {
        message: String,
    },
    /// Opaque collaborator invoked through the OS adapter; no concrete implementation ships.
    External(ExternalOp),
}
