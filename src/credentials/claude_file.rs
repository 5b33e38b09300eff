//! Shared container-managed Claude credential file
//!
//! When the host has no meaningful `~/.claude/.credentials.json`, a single
//! mode-0600 file under the data directory is overlay-mounted into every
//! container instead. Containers update it in place through the mount, so
//! it is created once and never deleted.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::paths;

/// A host credential file below this size is treated as empty.
pub const MIN_CREDENTIAL_BYTES: u64 = 20;

const KEYRING_SERVICE: &str = "corral-containers-credentials";
const KEYRING_ACCOUNT: &str = "corral";

#[derive(Debug, Error)]
pub enum CredentialFileError {
    #[error("could not determine data directory")]
    NoDataDir,

    #[error("failed to set permissions on {path} to 0600: {source}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CredentialFileError>;

pub fn host_credential_path(home: &Path) -> PathBuf {
    home.join(".claude").join(".credentials.json")
}

/// True when the host file exists and holds at least `MIN_CREDENTIAL_BYTES`.
pub fn host_has_credentials(home: &Path) -> bool {
    fs::metadata(host_credential_path(home))
        .map(|meta| meta.len() >= MIN_CREDENTIAL_BYTES)
        .unwrap_or(false)
}

/// Create the shared credential file on first use and return its path.
/// Initialization sources in order: the macOS keyring, the host credential
/// file, an empty JSON object.
pub fn ensure_shared_file(home: &Path) -> Result<PathBuf> {
    let dir = paths::credentials_dir().ok_or(CredentialFileError::NoDataDir)?;
    fs::create_dir_all(&dir)?;
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o755))?;

    let file = dir.join("claude-credentials.json");
    if file.exists() {
        return Ok(file);
    }

    let content = initial_credentials(home).unwrap_or_else(|| "{}".to_string());
    fs::write(&file, content)?;
    fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).map_err(|source| {
        CredentialFileError::PermissionDenied {
            path: file.clone(),
            source,
        }
    })?;

    debug!("initialized shared credential file at {}", file.display());
    Ok(file)
}

fn initial_credentials(home: &Path) -> Option<String> {
    if cfg!(target_os = "macos") {
        let output = Command::new("security")
            .args([
                "find-generic-password",
                "-s",
                KEYRING_SERVICE,
                "-a",
                KEYRING_ACCOUNT,
                "-w",
            ])
            .output()
            .ok()?;
        if output.status.success() {
            let secret = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !secret.is_empty() {
                return Some(secret);
            }
        }
        return None;
    }

    fs::read_to_string(host_credential_path(home)).ok()
}
