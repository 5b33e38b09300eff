//! Config store wiring: partial updates, unknown-field preservation, and
//! the version tracking file.

use std::fs;

use serde_json::Value;
use serial_test::serial;
use tempfile::tempdir;

use corral::config::version_tracking::VersionTracking;
use corral::config::{env_text, update_config_file, Config, ConfigUpdates, Credentials};

#[test]
fn partial_update_keeps_unknown_top_level_keys() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{
            "container_runtime": "docker",
            "default_credentials": {"git": true, "ssh": false, "aws": false},
            "default_env_vars": ["ANTHROPIC_API_KEY"],
            "experimental": {"enabled": true, "flags": ["a", "b"]}
        }"#,
    )
    .unwrap();

    // Flip only default_credentials.aws.
    let mut creds = Config::load_from(&path).unwrap().default_credentials;
    assert!(!creds.aws);
    creds.aws = true;
    update_config_file(
        &path,
        &ConfigUpdates {
            default_credentials: Some(creds),
            ..Default::default()
        },
    )
    .unwrap();

    let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["experimental"]["enabled"], Value::Bool(true));
    assert_eq!(raw["experimental"]["flags"], serde_json::json!(["a", "b"]));
    assert_eq!(raw["default_credentials"]["aws"], Value::Bool(true));
    assert_eq!(raw["default_credentials"]["git"], Value::Bool(true));
    assert_eq!(raw["container_runtime"], "docker");
    assert_eq!(raw["default_env_vars"], serde_json::json!(["ANTHROPIC_API_KEY"]));
}

#[test]
fn nested_unknown_fields_survive_a_full_save() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{
            "default_container": {"image": "x:1", "registry_mirror": "mirror.local"},
            "notes": "hand-edited"
        }"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.default_container.image, "x:1");
    config.save_to(&path).unwrap();

    let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["notes"], "hand-edited");
    assert_eq!(raw["default_container"]["registry_mirror"], "mirror.local");
}

#[test]
fn update_on_fresh_file_writes_first_run_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");

    update_config_file(
        &path,
        &ConfigUpdates {
            default_credentials: Some(Credentials::all()),
            ..Default::default()
        },
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert!(config.default_credentials.gpg);
    assert!(config
        .default_env_vars
        .iter()
        .any(|v| v == "ANTHROPIC_API_KEY"));
    assert!(config.default_container.check_for_updates);
}

#[test]
fn env_text_roundtrips_configured_vars() {
    let config = Config {
        default_env_vars: vec!["ANTHROPIC_API_KEY".into(), "GH_TOKEN".into()],
        ..Default::default()
    };

    let set = env_text::EnvVarSet {
        pass_through: config.default_env_vars.clone(),
        fixed: vec![("NODE_ENV".into(), "development".into())],
    };
    let text = env_text::serialize(&set);
    let parsed = env_text::parse(&text);
    assert_eq!(parsed, set);

    let validation = env_text::validate(&text);
    assert!(validation.is_valid);
    assert_eq!(validation.variable_count, 3);
}

#[test]
#[serial]
fn version_tracking_roundtrip_under_xdg_config() {
    let dir = tempdir().unwrap();
    std::env::set_var("XDG_CONFIG_HOME", dir.path());

    let path = corral::paths::version_tracking_path().unwrap();
    assert!(path.starts_with(dir.path()));

    let mut tracking = VersionTracking::load_or_default(&path);
    assert!(tracking.notifications.is_empty());

    tracking.last_check = Some(chrono::Utc::now());
    tracking.mark_notified("ghcr.io/corral-dev/corral-default:latest", "sha256:aa");
    tracking.save_to(&path).unwrap();

    let loaded = VersionTracking::load_or_default(&path);
    assert!(loaded.has_notified("ghcr.io/corral-dev/corral-default:latest", "sha256:aa"));
    assert!(loaded.last_check.is_some());

    std::env::remove_var("XDG_CONFIG_HOME");
}
