//! End-to-end checks against the compiled `remapd` binary itself (§6, §7 exit code contract).
//! These exercise the process boundary directly via `CARGO_BIN_EXE_remapd` rather than calling
//! internal functions, since `main.rs` exposes no library surface.

use std::io::Write;
use std::process::Command;

fn remapd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_remapd"))
}

#[test]
fn missing_config_file_exits_config_load_failure() {
    let output = remapd()
        .arg("--config")
        .arg("/definitely/does/not/exist/remap.toml")
        .output()
        .expect("failed to run remapd");
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn malformed_config_exits_config_load_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remap.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "this is not valid toml {{{{{{").unwrap();

    let output = remapd()
        .arg("--config")
        .arg(&path)
        .output()
        .expect("failed to run remapd");
    assert_eq!(output.status.code(), Some(3));
}

/// With no `linux-hw` feature, the daemon falls back to an empty in-memory input source, whose
/// `recv` returns `Ok(None)` immediately — the hot path shuts the whole process down cleanly on
/// its very first iteration.
#[test]
fn minimal_valid_config_runs_to_clean_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remap.toml");
    std::fs::write(
        &path,
        r#"
        default_keymap = "global"

        [[keymap]]
        name = "global"
        "#,
    )
    .unwrap();

    let output = remapd()
        .arg("--config")
        .arg(&path)
        .output()
        .expect("failed to run remapd");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn journey_flag_is_accepted_alongside_a_minimal_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remap.toml");
    std::fs::write(
        &path,
        r#"
        default_keymap = "global"

        [[keymap]]
        name = "global"
        "#,
    )
    .unwrap();

    let output = remapd()
        .arg("--config")
        .arg(&path)
        .arg("--journey")
        .output()
        .expect("failed to run remapd");
    assert_eq!(output.status.code(), Some(0));
}
