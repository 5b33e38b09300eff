//! User configuration management
//!
//! The config file is JSON at `$XDG_CONFIG_HOME/corral/config.json`. Fields
//! the schema does not model are captured in a flattened map so partial
//! updates never lose them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

pub mod env_text;
pub mod version_tracking;

use crate::paths;

pub const DEFAULT_IMAGE: &str = "ghcr.io/corral-dev/corral-default:latest";

/// API keys and tokens proxied into containers when present on the host.
pub const DEFAULT_PASS_THROUGH_VARS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "GH_TOKEN",
    "GITHUB_TOKEN",
    "QWEN_API_KEY",
    "CURSOR_API_KEY",
    "AMP_API_KEY",
    "DEEPSEEK_API_KEY",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("could not determine home directory")]
    NoHome,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Known container runtime backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    Docker,
    Podman,
    AppleContainer,
}

impl RuntimeKind {
    /// The executable name on `$PATH`.
    pub fn program(&self) -> &'static str {
        match self {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Podman => "podman",
            RuntimeKind::AppleContainer => "container",
        }
    }

    pub fn parse(s: &str) -> Option<RuntimeKind> {
        match s {
            "docker" => Some(RuntimeKind::Docker),
            "podman" => Some(RuntimeKind::Podman),
            "apple-container" | "container" => Some(RuntimeKind::AppleContainer),
            _ => None,
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Podman => "podman",
            RuntimeKind::AppleContainer => "apple-container",
        };
        write!(f, "{}", name)
    }
}

/// Which host credential categories are mounted into containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub git: bool,

    #[serde(default)]
    pub ssh: bool,

    #[serde(default)]
    pub gh: bool,

    #[serde(default)]
    pub gpg: bool,

    #[serde(default)]
    pub npm: bool,

    #[serde(default)]
    pub aws: bool,
}

impl Credentials {
    pub fn all() -> Self {
        Self {
            git: true,
            ssh: true,
            gh: true,
            gpg: true,
            npm: true,
            aws: true,
        }
    }

    /// Union of two toggle sets. CLI flags can only enable categories on top
    /// of the configured defaults.
    pub fn union(self, other: Credentials) -> Self {
        Self {
            git: self.git || other.git,
            ssh: self.ssh || other.ssh,
            gh: self.gh || other.gh,
            gpg: self.gpg || other.gpg,
            npm: self.npm || other.npm,
            aws: self.aws || other.aws,
        }
    }
}

/// Named environment variable bundle selectable at launch time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultContainerConfig {
    #[serde(default)]
    pub image: String,

    #[serde(default = "default_true")]
    pub check_for_updates: bool,

    #[serde(default)]
    pub auto_pull_updates: bool,

    #[serde(default = "default_check_frequency")]
    pub check_frequency_hours: u64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for DefaultContainerConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            check_for_updates: true,
            auto_pull_updates: false,
            check_frequency_hours: 24,
            extra: Map::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_check_frequency() -> u64 {
    24
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Preferred backend: "docker", "podman" or "apple-container".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container_runtime: String,

    /// Deprecated; read only when `default_container.image` is empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_image: String,

    #[serde(default)]
    pub default_credentials: Credentials,

    #[serde(default)]
    pub default_env_vars: Vec<String>,

    #[serde(default)]
    pub env_configs: BTreeMap<String, EnvConfig>,

    #[serde(default)]
    pub default_container: DefaultContainerConfig,

    /// Fields not modelled by this schema, preserved verbatim across writes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Config {
    /// First-run config: all defaults plus the built-in pass-through list.
    pub fn first_run() -> Self {
        Self {
            default_env_vars: DEFAULT_PASS_THROUGH_VARS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Self::default()
        }
    }

    pub fn runtime_preference(&self) -> Option<RuntimeKind> {
        RuntimeKind::parse(&self.container_runtime)
    }

    pub fn effective_default_image(&self) -> String {
        if !self.default_container.image.is_empty() {
            return self.default_container.image.clone();
        }
        if !self.default_image.is_empty() {
            return self.default_image.clone();
        }
        DEFAULT_IMAGE.to_string()
    }

    /// Pass-through variable names, falling back to the built-in list when the
    /// config does not name any.
    pub fn pass_through_vars(&self) -> Vec<String> {
        if self.default_env_vars.is_empty() {
            DEFAULT_PASS_THROUGH_VARS
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.default_env_vars.clone()
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the config, degrading to defaults when the file is missing or
    /// unreadable. Parse failures are surfaced as warnings, not fatals.
    pub fn load_or_default() -> Self {
        let Some(path) = paths::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("using default configuration: {}", e);
                eprintln!("Warning: {}", e);
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let path = paths::config_path().ok_or(ConfigError::NoHome)?;
        self.save_to(&path)
    }
}

/// Partial update applied through a read-modify-write of the whole file.
/// Only the fields set here change; everything else, including unknown
/// fields, survives.
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdates {
    pub container_runtime: Option<String>,
    pub default_credentials: Option<Credentials>,
    pub default_container: Option<DefaultContainerConfig>,
    pub default_env_vars: Option<Vec<String>>,
}

impl ConfigUpdates {
    pub fn is_empty(&self) -> bool {
        self.container_runtime.is_none()
            && self.default_credentials.is_none()
            && self.default_container.is_none()
            && self.default_env_vars.is_none()
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(runtime) = &self.container_runtime {
            config.container_runtime = runtime.clone();
        }
        if let Some(creds) = self.default_credentials {
            config.default_credentials = creds;
        }
        if let Some(container) = &self.default_container {
            config.default_container = container.clone();
        }
        if let Some(vars) = &self.default_env_vars {
            config.default_env_vars = vars.clone();
        }
    }
}

/// Load the file (or start from defaults), apply the updates, write back.
pub fn update_config_file(path: &Path, updates: &ConfigUpdates) -> Result<()> {
    let mut config = if path.exists() {
        Config::load_from(path)?
    } else {
        Config::first_run()
    };
    updates.apply(&mut config);
    config.save_to(path)
}

/// Expand `${NAME}` references against a host environment lookup. Unknown
/// names expand to the empty string; everything else passes through verbatim.
pub fn expand_host_vars<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let name = &rest[start + 2..start + 2 + end];
                if let Some(val) = lookup(name) {
                    out.push_str(&val);
                }
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_deserialize_empty_object() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.container_runtime.is_empty());
        assert!(config.default_credentials == Credentials::default());
        assert!(config.default_container.check_for_updates);
        assert_eq!(config.default_container.check_frequency_hours, 24);
    }

    #[test]
    fn test_effective_default_image_priority() {
        let mut config = Config::default();
        config.default_container.image = String::new();
        assert_eq!(config.effective_default_image(), DEFAULT_IMAGE);

        config.default_image = "legacy:1".into();
        assert_eq!(config.effective_default_image(), "legacy:1");

        config.default_container.image = "current:2".into();
        assert_eq!(config.effective_default_image(), "current:2");
    }

    #[test]
    fn test_runtime_kind_parse() {
        assert_eq!(RuntimeKind::parse("docker"), Some(RuntimeKind::Docker));
        assert_eq!(RuntimeKind::parse("podman"), Some(RuntimeKind::Podman));
        assert_eq!(
            RuntimeKind::parse("apple-container"),
            Some(RuntimeKind::AppleContainer)
        );
        assert_eq!(RuntimeKind::parse("lxc"), None);
    }

    #[test]
    fn test_credentials_union() {
        let base = Credentials {
            git: true,
            ..Default::default()
        };
        let extra = Credentials {
            aws: true,
            ..Default::default()
        };
        let merged = base.union(extra);
        assert!(merged.git);
        assert!(merged.aws);
        assert!(!merged.ssh);
    }

    #[test]
    fn test_pass_through_vars_fallback() {
        let config = Config::default();
        assert!(config
            .pass_through_vars()
            .contains(&"ANTHROPIC_API_KEY".to_string()));

        let config = Config {
            default_env_vars: vec!["ONLY_THIS".into()],
            ..Default::default()
        };
        assert_eq!(config.pass_through_vars(), vec!["ONLY_THIS".to_string()]);
    }

    #[test]
    fn test_partial_update_preserves_unknown_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "container_runtime": "docker",
                "default_credentials": {"git": true, "aws": false},
                "experimental": {"feature_x": [1, 2, 3]}
            }"#,
        )
        .unwrap();

        let updates = ConfigUpdates {
            default_credentials: Some(Credentials {
                git: true,
                aws: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        update_config_file(&path, &updates).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["experimental"]["feature_x"], serde_json::json!([1, 2, 3]));
        assert_eq!(raw["default_credentials"]["aws"], Value::Bool(true));
        assert_eq!(raw["container_runtime"], Value::String("docker".into()));
    }

    #[test]
    fn test_partial_update_on_missing_file_seeds_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let updates = ConfigUpdates {
            container_runtime: Some("podman".into()),
            ..Default::default()
        };
        update_config_file(&path, &updates).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.container_runtime, "podman");
        assert!(config
            .default_env_vars
            .contains(&"ANTHROPIC_API_KEY".to_string()));
    }

    #[test]
    fn test_config_roundtrip_keeps_env_configs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.env_configs.insert(
            "staging".into(),
            EnvConfig {
                name: "Staging".into(),
                description: "staging API endpoints".into(),
                env_vars: BTreeMap::from([(
                    "API_BASE_URL".into(),
                    "https://staging.example.com".into(),
                )]),
                ..Default::default()
            },
        );
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.env_configs["staging"].name, "Staging");
        assert_eq!(
            loaded.env_configs["staging"].env_vars["API_BASE_URL"],
            "https://staging.example.com"
        );
    }

    #[test]
    fn test_expand_host_vars() {
        let lookup = |name: &str| match name {
            "TOKEN" => Some("secret".to_string()),
            _ => None,
        };
        assert_eq!(expand_host_vars("plain", lookup), "plain");
        assert_eq!(expand_host_vars("${TOKEN}", lookup), "secret");
        assert_eq!(
            expand_host_vars("Bearer ${TOKEN}/v1", lookup),
            "Bearer secret/v1"
        );
        assert_eq!(expand_host_vars("${MISSING}", lookup), "");
        assert_eq!(expand_host_vars("${UNCLOSED", lookup), "${UNCLOSED");
    }
}
