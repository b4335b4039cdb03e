//! Raw TOML schema for `remap.toml` (§6 `install_config` contract, §3 data model). Deserialized
//! with `serde`, then resolved into the compiled `core-keymap`/`core-modifier`/`core-actions`
//! types by [`crate::build`].

use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub(crate) struct RawConfig {
    pub default_keymap: String,
    #[serde(default)]
    pub trigger: Vec<RawTrigger>,
    #[serde(default)]
    pub locks: RawLocks,
    #[serde(default)]
    pub action: Vec<RawAction>,
    #[serde(default)]
    pub keymap: Vec<RawKeymap>,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct RawLocks {
    /// Lock numbers (L00..LFF) active at startup, absent a persisted lock-state sidecar file.
    #[serde(default)]
    pub initial: Vec<u8>,
}

fn default_threshold_ms() -> u64 {
    core_modifier::DEFAULT_THRESHOLD_MS
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTrigger {
    pub trigger_code: u16,
    pub mod_num: u8,
    #[serde(default)]
    pub tap_output: Option<u16>,
    #[serde(default = "default_threshold_ms")]
    pub threshold_ms: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawKeymap {
    pub name: String,
    #[serde(default)]
    pub class_regex: Option<String>,
    #[serde(default)]
    pub title_regex: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub rule: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawRule {
    pub input: u16,
    #[serde(default)]
    pub required_on: Vec<String>,
    #[serde(default)]
    pub required_off: Vec<String>,
    pub output: u16,
    /// Index into the top-level `[[action]]` array, if this rule fires one.
    #[serde(default)]
    pub action: Option<u32>,
}

/// One PRESS/RELEASE step of a scripted key sequence, as `(internal_code, "press"|"release")`.
#[derive(Debug, Deserialize, Clone)]
pub(crate) struct RawSeqStep(pub u16, pub RawEventType);

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RawEventType {
    Press,
    Release,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub(crate) enum RawVariableOp {
    Set(i64),
    Increment(i64),
    Reset,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum RawActionKind {
    KeySequence {
        sequence: Vec<RawSeqStep>,
    },
    ToggleLock {
        lock_num: u8,
    },
    PrefixPush {
        keymap: String,
    },
    PrefixParent,
    PrefixPrev,
    PrefixCancel,
    Repeat {
        sequence: Vec<RawSeqStep>,
        count_var: String,
    },
    VariableMutate {
        name: String,
        op: RawVariableOp,
    },
    Help,
    Notify {
        message: String,
    },
    ShellExecute {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    WindowManagement {
        op: String,
    },
    ClipboardWrite {
        text: String,
    },
    ImeToggle,
    PlugIn {
        name: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAction {
    #[serde(flatten)]
    pub kind: RawActionKind,
}
