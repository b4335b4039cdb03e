//! `LoadError` (§6 `install_config`, §7 `config_install_rejected`): a config that fails to parse
//! or validate is rejected wholesale, never partially applied. Unlike the teacher's own
//! `oxidized.toml` loader — which falls back to defaults on a parse error — a rejected remap
//! config here must leave whatever configuration is already running untouched (§7: "the previous
//! configuration stays live; the caller is told why"), so every failure mode is a typed `Err`
//! rather than a silent default.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("keymap '{0}' declares parent '{1}', which is not defined")]
    UnknownParent(String, String),

    #[error("action references keymap '{0}', which is not defined")]
    UnknownActionKeymap(String),

    #[error("rule in keymap '{0}' references action index {1}, but only {2} action(s) are defined")]
    UnknownAction(String, u32, usize),

    #[error("invalid modifier bit specification '{spec}': {reason}")]
    InvalidModBit { spec: String, reason: String },

    #[error("duplicate keymap name '{0}'")]
    DuplicateKeymap(String),

    #[error("default_keymap '{0}' is not defined")]
    UnknownDefaultKeymap(String),

    #[error("invalid regex in keymap '{keymap}': {source}")]
    InvalidRegex {
        keymap: String,
        #[source]
        source: regex::Error,
    },

    #[error("trigger for internal code {0} has threshold_ms == 0")]
    ZeroThreshold(u16),
}
