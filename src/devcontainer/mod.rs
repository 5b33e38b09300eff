//! Dev container specification
//!
//! Loads `.devcontainer/devcontainer.json` from under the mount path. A
//! missing file synthesizes a default bound to the configured default image
//! with a probe-resolved remote user. `features` are parsed so nothing is
//! lost on round-trip, but never materialized.

pub mod user_detect;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::runtime::{ContainerRuntime, RuntimeError};
pub use user_detect::UserDetector;

#[derive(Debug, Error)]
pub enum DevContainerError {
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "user '{user}' does not exist in image '{image}'.\n\
         Fix one of:\n\
         - set \"remoteUser\" in .devcontainer/devcontainer.json to a user the image provides\n\
         - use an image that contains the '{user}' user\n\
         - build a custom image that adds the user"
    )]
    UserNotInImage { user: String, image: String },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DevContainerError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DevContainerSpec {
    pub image: String,

    #[serde(rename = "dockerFile")]
    pub dockerfile: String,

    pub remote_user: String,

    /// Parsed but not materialized.
    pub features: Option<Value>,

    pub post_create_command: Option<Value>,

    pub forward_ports: Vec<Value>,

    pub mounts: Vec<Value>,

    pub container_env: BTreeMap<String, String>,

    pub name: String,
}

impl DevContainerSpec {
    pub fn has_features(&self) -> bool {
        self.features
            .as_ref()
            .and_then(Value::as_object)
            .is_some_and(|m| !m.is_empty())
    }

    pub fn feature_list(&self) -> Vec<String> {
        self.features
            .as_ref()
            .and_then(Value::as_object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Load `.devcontainer/devcontainer.json` if present. When the parsed spec
/// names no user, the detector resolves one for the image.
pub fn load(
    mount_path: &Path,
    runtime: &ContainerRuntime,
    detector: &mut UserDetector,
) -> Result<Option<DevContainerSpec>> {
    let config_path = mount_path.join(".devcontainer").join("devcontainer.json");
    if !config_path.exists() {
        return Ok(None);
    }

    let data = std::fs::read_to_string(&config_path)?;
    let mut spec: DevContainerSpec =
        serde_json::from_str(&data).map_err(|source| DevContainerError::Parse {
            path: config_path,
            source,
        })?;

    if spec.remote_user.is_empty() && !spec.image.is_empty() {
        spec.remote_user = detector.resolve(runtime, &spec.image);
    }

    Ok(Some(spec))
}

/// The synthesized spec used when a project has no devcontainer.json.
pub fn default_spec(
    default_image: &str,
    runtime: &ContainerRuntime,
    detector: &mut UserDetector,
) -> DevContainerSpec {
    DevContainerSpec {
        image: default_image.to_string(),
        remote_user: detector.resolve(runtime, default_image),
        ..Default::default()
    }
}
