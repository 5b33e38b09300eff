//! Credential planning
//!
//! Decides which host credential sources participate in an invocation.
//! Every category is opt-in; enabled categories contribute only when their
//! source path actually exists on the host.

pub mod aws;
pub mod claude_file;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::Credentials;

/// Well-known per-agent configuration directories mirrored into containers
/// when they exist under the host home.
pub const AGENT_CONFIG_DIRS: &[&str] = &[
    ".codex",
    ".gemini",
    ".copilot",
    ".qwen",
    ".cursor",
    ".deepseek",
    ".config/amp",
];

/// The assembled credential inputs for one invocation.
#[derive(Debug, Clone, Default)]
pub struct CredentialPlan {
    pub credentials: Credentials,

    /// Home-relative agent config directories present on the host.
    pub agent_config_dirs: Vec<String>,

    /// Resolved AWS variables in injection order.
    pub aws_env: Vec<(String, String)>,

    /// Shared credential file to overlay-mount over
    /// `.claude/.credentials.json`; set when the host has no meaningful
    /// credential file of its own.
    pub claude_overlay: Option<PathBuf>,
}

/// Build the plan from the effective credential toggles, the host home and
/// a snapshot of the host environment.
pub fn build_plan(
    home: &Path,
    credentials: Credentials,
    host_env: &BTreeMap<String, String>,
) -> CredentialPlan {
    let agent_config_dirs = AGENT_CONFIG_DIRS
        .iter()
        .filter(|dir| home.join(dir).exists())
        .map(|dir| dir.to_string())
        .collect();

    let aws_env = if credentials.aws {
        if !home.join(".aws").exists() {
            // Without ~/.aws the CLI loses SSO tokens and its cache.
            warn!("~/.aws directory not found; AWS CLI config and SSO cache unavailable");
            eprintln!(
                "Warning: ~/.aws directory not found, AWS CLI config and SSO cache unavailable"
            );
        }
        aws::resolve(home, host_env)
    } else {
        Vec::new()
    };

    let claude_overlay = if claude_file::host_has_credentials(home) {
        None
    } else {
        match claude_file::ensure_shared_file(home) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("cannot prepare shared credential file: {}", e);
                eprintln!("Warning: cannot prepare shared credential file: {}", e);
                None
            }
        }
    };

    debug!(
        "credential plan: agents={:?} aws_vars={} overlay={}",
        agent_config_dirs,
        aws_env.len(),
        claude_overlay.is_some()
    );

    CredentialPlan {
        credentials,
        agent_config_dirs,
        aws_env,
        claude_overlay,
    }
}
