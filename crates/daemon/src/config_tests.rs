// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |var: &str| map.get(var).cloned()
}

#[test]
fn defaults_without_file() {
    let config = Config::load_with_env(None, env_of(&[("HOME", "/home/u")])).unwrap();

    assert_eq!(config.listen, DEFAULT_LISTEN);
    assert_eq!(config.state_dir, PathBuf::from("/home/u/.local/state/chorus"));
    assert_eq!(config.resume_window, Duration::from_secs(120));
    assert_eq!(config.outbound_buffer, DEFAULT_SESSION_BUFFER);
    assert_eq!(config.messages_path(), config.state_dir.join("messages.log"));
}

#[test]
fn xdg_state_home_wins_over_home() {
    let config = Config::load_with_env(
        None,
        env_of(&[("HOME", "/home/u"), ("XDG_STATE_HOME", "/xdg")]),
    )
    .unwrap();
    assert_eq!(config.state_dir, PathBuf::from("/xdg/chorus"));
}

#[test]
fn missing_home_is_an_error() {
    let err = Config::load_with_env(None, env_of(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::NoStateDir));
}

#[test]
fn file_values_are_applied() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("chorus.toml");
    std::fs::write(
        &path,
        r#"
listen = "0.0.0.0:4000"
state_dir = "/srv/chorus"
resume_window = "30s"
outbound_buffer = 16
max_frame_bytes = 4096
"#,
    )
    .unwrap();

    let config = Config::load_with_env(Some(&path), env_of(&[])).unwrap();

    assert_eq!(config.listen, "0.0.0.0:4000".parse().unwrap());
    assert_eq!(config.state_dir, PathBuf::from("/srv/chorus"));
    assert_eq!(config.resume_window, Duration::from_secs(30));
    assert_eq!(config.outbound_buffer, 16);
    assert_eq!(config.max_frame_bytes, 4096);
}

#[test]
fn env_overrides_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("chorus.toml");
    std::fs::write(&path, "listen = \"0.0.0.0:4000\"\nstate_dir = \"/srv/chorus\"\n").unwrap();

    let config = Config::load_with_env(
        Some(&path),
        env_of(&[
            ("CHORUS_LISTEN", "127.0.0.1:5000"),
            ("CHORUS_STATE_DIR", "/tmp/chorus-test"),
        ]),
    )
    .unwrap();

    assert_eq!(config.listen, "127.0.0.1:5000".parse().unwrap());
    assert_eq!(config.state_dir, PathBuf::from("/tmp/chorus-test"));
}

#[test]
fn invalid_listen_env_is_reported() {
    let err = Config::load_with_env(
        None,
        env_of(&[("HOME", "/h"), ("CHORUS_LISTEN", "nowhere")]),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnv { var: "CHORUS_LISTEN", .. }));
}

#[test]
fn unknown_keys_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("chorus.toml");
    std::fs::write(&path, "rooms = 3\n").unwrap();

    let err = Config::load_with_env(Some(&path), env_of(&[("HOME", "/h")])).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn zero_buffer_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("chorus.toml");
    std::fs::write(&path, "outbound_buffer = 0\n").unwrap();

    let err = Config::load_with_env(Some(&path), env_of(&[("HOME", "/h")])).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}
