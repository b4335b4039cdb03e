//! Configuration loading (§4.H "(NEW) core-config", §6 `install_config`): parses `remap.toml`
//! into the compiled types the engine actually runs against, and persists/restores the small
//! lock-state sidecar across restarts (§6 "Persisted state").
//!
//! Unlike the teacher's own `oxidized.toml` loader, a parse or validation failure here is never
//! silently swallowed into a default configuration — see [`LoadError`] and the module doc on
//! [`build`]. A rejected config must leave whatever configuration the daemon is already running
//! untouched (§7 `config_install_rejected`).

mod build;
mod error;
mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use core_actions::ActionKind;
use core_keymap::{KeymapArena, KeymapId};
use core_modifier::TriggerRegistration;
use serde::{Deserialize, Serialize};

pub use error::LoadError;
pub(crate) use schema::RawConfig;

/// Fully resolved configuration, ready to install into `EventProcessor`/`FocusResolver` (§6
/// `install_config`). Produced only by [`load_config`] — there is no public constructor, since a
/// `Config` is meaningless without having passed the loader's validation.
pub struct Config {
    pub arena: KeymapArena,
    pub default_keymap: KeymapId,
    pub triggers: Vec<TriggerRegistration>,
    pub initial_locks: Vec<u8>,
    pub actions: Vec<ActionKind>,
}

/// Locate the active config file: a `remap.toml` in the working directory takes precedence (handy
/// for `remapd --config` free iteration), falling back to the platform's XDG/AppData config
/// directory (`dirs::config_dir()`), mirroring the teacher's own `discover()`.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("remap.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("remapd").join("remap.toml");
    }
    PathBuf::from("remap.toml")
}

/// Load and fully resolve a configuration from `path` (or the result of [`discover`]). Any parse
/// or semantic error (unknown keymap parent, duplicate keymap name, out-of-range action index,
/// zero trigger threshold, invalid modifier-bit spec) is returned as `Err` without partially
/// constructing a `Config` (§7).
pub fn load_config(path: Option<PathBuf>) -> Result<Config, LoadError> {
    let path = path.unwrap_or_else(discover);
    let content = fs::read_to_string(&path).map_err(|source| LoadError::Io {
        path: path.clone(),
        source,
    })?;
    let raw: RawConfig = toml::from_str(&content)?;
    let built = build::build(raw)?;
    tracing::info!(
        target: "core_config",
        path = %path.display(),
        keymaps = built.arena.len(),
        triggers = built.triggers.len(),
        actions = built.actions.len(),
        "config_loaded"
    );
    Ok(Config {
        arena: built.arena,
        default_keymap: built.default_keymap,
        triggers: built.triggers,
        initial_locks: built.initial_locks,
        actions: built.actions,
    })
}

// -------------------------------------------------------------------------------------------------
// Lock-state sidecar (§6 "Persisted state")
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Default)]
struct LockSidecar {
    #[serde(default)]
    locks: Vec<u8>,
}

/// Default sidecar path, colocated with the discovered config directory.
pub fn default_lock_state_path() -> PathBuf {
    if let Some(dir) = dirs::config_dir() {
        dir.join("remapd").join("locks.toml")
    } else {
        PathBuf::from("remapd-locks.toml")
    }
}

/// Snapshot the currently-active lock numbers (L00..LFF) to `path` on clean shutdown (§6). Best
/// effort is not acceptable here — a write failure is surfaced so the daemon can log it, but it is
/// never fatal to shutdown itself.
pub fn persist_locks(path: &Path, locks: &[u8]) -> Result<(), LoadError> {
    let sidecar = LockSidecar {
        locks: locks.to_vec(),
    };
    let serialized = toml::to_string_pretty(&sidecar).expect("lock sidecar always serializes");
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    fs::write(path, serialized).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Restore previously persisted lock numbers, if a sidecar file exists. A missing file is not an
/// error (first run, or no locks were ever held); a malformed one is.
pub fn restore_locks(path: &Path) -> Result<Vec<u8>, LoadError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let sidecar: LockSidecar = toml::from_str(&content)?;
    Ok(sidecar.locks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_minimal_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("remap.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_minimal_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_minimal_config(
            &dir,
            r#"
            default_keymap = "global"

            [[keymap]]
            name = "global"
            "#,
        );
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.arena.len(), 1);
        assert_eq!(cfg.default_keymap, KeymapId(0));
        assert!(cfg.triggers.is_empty());
        assert!(cfg.actions.is_empty());
    }

    #[test]
    fn rejects_unknown_default_keymap_without_partial_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_minimal_config(
            &dir,
            r#"
            default_keymap = "missing"

            [[keymap]]
            name = "global"
            "#,
        );
        let err = load_config(Some(path)).unwrap_err();
        assert!(matches!(err, LoadError::UnknownDefaultKeymap(name) if name == "missing"));
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_minimal_config(&dir, "this is not valid toml {{{");
        assert!(matches!(load_config(Some(path)), Err(LoadError::Parse(_))));
    }

    #[test]
    fn missing_file_is_an_io_error_not_a_default() {
        let err = load_config(Some(PathBuf::from("__definitely_missing__.toml"))).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn full_config_with_trigger_rule_and_action_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_minimal_config(
            &dir,
            r#"
            default_keymap = "global"

            [[trigger]]
            trigger_code = 58
            mod_num = 0
            tap_output = 1
            threshold_ms = 200

            [[action]]
            kind = "help"

            [[keymap]]
            name = "global"

            [[keymap.rule]]
            input = 35
            required_on = ["mod:0"]
            output = 105
            action = 0
            "#,
        );
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.triggers.len(), 1);
        assert_eq!(cfg.actions.len(), 1);
        assert_eq!(cfg.actions[0], ActionKind::Help);
    }

    #[test]
    fn lock_sidecar_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks.toml");
        persist_locks(&path, &[0, 5, 255]).unwrap();
        let restored = restore_locks(&path).unwrap();
        assert_eq!(restored, vec![0, 5, 255]);
    }

    #[test]
    fn restore_locks_on_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");
        assert_eq!(restore_locks(&path).unwrap(), Vec::<u8>::new());
    }
}
