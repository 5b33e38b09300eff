//! AWS credential resolution
//!
//! Priority order: static credentials already in the environment, then the
//! profile's `credential_process`, then whatever `AWS_*` variables the host
//! carries. Failures along the way degrade with warnings; they never abort
//! an invocation. Credentials obtained from `credential_process` are a
//! snapshot at container start and are not refreshed.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

pub const CREDENTIAL_PROCESS_TIMEOUT_SECS: u64 = 30;

/// Host-specific container metadata endpoints that cannot work from inside
/// the sandbox.
pub const ENV_BLOCKLIST: &[&str] = &[
    "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI",
    "AWS_CONTAINER_CREDENTIALS_FULL_URI",
    "AWS_CONTAINER_AUTHORIZATION_TOKEN",
];

const CREDENTIAL_KEYS: &[&str] = &[
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
];

#[derive(Debug, Error)]
pub enum AwsError {
    #[error("credential_process timed out after {0} seconds")]
    ProcessTimeout(u64),

    #[error("credential_process failed: {0}")]
    ProcessFailed(String),

    #[error("failed to parse credential_process output: {0}")]
    ProcessParse(String),

    #[error("failed to open AWS config at {0}")]
    ConfigUnreadable(String),

    #[error("profile '{0}' not found in AWS config")]
    ProfileNotFound(String),

    #[error("profile '{0}' exists but has no credential_process configured")]
    NoCredentialProcess(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AwsError>;

/// Credentials in the AWS `credential_process` output format.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessCredentials {
    #[serde(rename = "AccessKeyId", default)]
    pub access_key_id: String,

    #[serde(rename = "SecretAccessKey", default)]
    pub secret_access_key: String,

    #[serde(rename = "SessionToken", default)]
    pub session_token: String,

    #[serde(rename = "Expiration", default)]
    pub expiration: String,

    #[serde(rename = "Version", default)]
    pub version: i64,
}

/// All `AWS_*` variables from the host snapshot, minus the blocklist.
pub fn aws_env_vars(host_env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    host_env
        .iter()
        .filter(|(key, _)| key.starts_with("AWS_"))
        .filter(|(key, _)| !ENV_BLOCKLIST.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Static credentials are considered present when both halves of the key
/// pair are set, with or without a session token.
pub fn has_static_credentials(host_env: &BTreeMap<String, String>) -> bool {
    let set = |key: &str| host_env.get(key).is_some_and(|v| !v.is_empty());
    set("AWS_ACCESS_KEY_ID") && set("AWS_SECRET_ACCESS_KEY")
}

/// Extract the `credential_process` directive for a profile from an AWS
/// config document. Sections are `[profile <name>]` or the literal
/// `[default]`; `#` and `;` start comments.
pub fn parse_config(content: &str, profile: &str) -> Result<String> {
    let mut current_profile = String::new();
    let mut credential_process = String::new();
    let mut profile_found = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            let section = line.trim_matches(['[', ']']).trim();
            current_profile = match section.strip_prefix("profile ") {
                Some(name) => name.trim().to_string(),
                None => section.to_string(),
            };
            if current_profile == profile {
                profile_found = true;
            }
            continue;
        }

        if current_profile == profile && line.starts_with("credential_process") {
            if let Some((_, value)) = line.split_once('=') {
                let mut value = value.trim();
                // Strip inline comments.
                if let Some(idx) = value.find(['#', ';']).filter(|idx| *idx > 0) {
                    value = value[..idx].trim();
                }
                credential_process = value.to_string();
            }
        }
    }

    if !profile_found {
        return Err(AwsError::ProfileNotFound(profile.to_string()));
    }
    if credential_process.is_empty() {
        return Err(AwsError::NoCredentialProcess(profile.to_string()));
    }
    Ok(credential_process)
}

/// Locate and parse the AWS config file (`$AWS_CONFIG_FILE` or
/// `~/.aws/config`) for a profile's `credential_process`.
pub fn credential_process_for(
    profile: &str,
    home: &Path,
    host_env: &BTreeMap<String, String>,
) -> Result<String> {
    let config_path = host_env
        .get("AWS_CONFIG_FILE")
        .filter(|p| !p.is_empty())
        .map(|p| Path::new(p).to_path_buf())
        .unwrap_or_else(|| home.join(".aws").join("config"));

    let content = std::fs::read_to_string(&config_path)
        .map_err(|_| AwsError::ConfigUnreadable(config_path.display().to_string()))?;
    parse_config(&content, profile)
}

/// Execute a `credential_process` directive through a shell, bounded to 30
/// seconds, and parse its JSON output.
pub fn run_credential_process(command: &str) -> Result<ProcessCredentials> {
    if command.is_empty() {
        return Err(AwsError::ProcessFailed("empty credential_process".into()));
    }

    debug!("executing credential_process: {}", command);
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let deadline = Instant::now() + Duration::from_secs(CREDENTIAL_PROCESS_TIMEOUT_SECS);
    loop {
        match child.try_wait()? {
            Some(_) => break,
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AwsError::ProcessTimeout(CREDENTIAL_PROCESS_TIMEOUT_SECS));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }

    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stdout.take() {
        pipe.read_to_string(&mut stdout)?;
    }
    if let Some(mut pipe) = child.stderr.take() {
        pipe.read_to_string(&mut stderr)?;
    }
    let status = child.wait()?;
    if !status.success() {
        return Err(AwsError::ProcessFailed(format!(
            "{}\nOutput: {}{}",
            status,
            stdout.trim(),
            stderr.trim()
        )));
    }

    parse_process_output(&stdout)
}

fn parse_process_output(stdout: &str) -> Result<ProcessCredentials> {
    let creds: ProcessCredentials = serde_json::from_str(stdout.trim())
        .map_err(|e| AwsError::ProcessParse(format!("{}\nOutput: {}", e, stdout.trim())))?;

    if creds.access_key_id.is_empty() {
        return Err(AwsError::ProcessParse(
            "missing required field 'AccessKeyId'".into(),
        ));
    }
    if creds.secret_access_key.is_empty() {
        return Err(AwsError::ProcessParse(
            "missing required field 'SecretAccessKey'".into(),
        ));
    }
    Ok(creds)
}

/// Order variables deterministically: the credential pair (and session
/// token) first, then everything else sorted by name.
fn ordered(vars: BTreeMap<String, String>) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(vars.len());
    for key in CREDENTIAL_KEYS {
        if let Some(value) = vars.get(*key) {
            out.push((key.to_string(), value.clone()));
        }
    }
    for (key, value) in vars {
        if !CREDENTIAL_KEYS.contains(&key.as_str()) {
            out.push((key, value));
        }
    }
    out
}

/// Resolve the AWS variables for one invocation, walking the priority
/// ladder. Never fails: each rung degrades to the next with a warning.
pub fn resolve(home: &Path, host_env: &BTreeMap<String, String>) -> Vec<(String, String)> {
    if has_static_credentials(host_env) {
        debug!("using AWS credentials from host environment");
        return ordered(aws_env_vars(host_env));
    }

    if let Some(profile) = host_env.get("AWS_PROFILE").filter(|p| !p.is_empty()) {
        match credential_process_for(profile, home, host_env) {
            Ok(command) => match run_credential_process(&command) {
                Ok(creds) => {
                    debug!("obtained AWS credentials from credential_process");
                    let mut vars = aws_env_vars(host_env);
                    vars.insert("AWS_ACCESS_KEY_ID".into(), creds.access_key_id);
                    vars.insert("AWS_SECRET_ACCESS_KEY".into(), creds.secret_access_key);
                    if creds.session_token.is_empty() {
                        vars.remove("AWS_SESSION_TOKEN");
                    } else {
                        vars.insert("AWS_SESSION_TOKEN".into(), creds.session_token);
                    }
                    return ordered(vars);
                }
                Err(e) => {
                    warn!("credential_process failed: {}", e);
                    eprintln!("Warning: credential_process failed: {}", e);
                }
            },
            Err(e) => {
                warn!(
                    "failed to get credential_process for profile '{}': {}",
                    profile, e
                );
                eprintln!(
                    "Warning: failed to get credential_process for profile '{}': {}",
                    profile, e
                );
            }
        }
    }

    ordered(aws_env_vars(host_env))
}
