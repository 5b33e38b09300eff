//! Image version notification history
//!
//! Persisted to `$XDG_CONFIG_HOME/corral/version-tracking.json` so the update
//! checker does not re-notify about a digest it already mentioned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

use super::{ConfigError, Result};

/// Accept an explicit JSON `null` where a map is expected; `default` alone
/// only covers a missing field.
fn null_to_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionTracking {
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "null_to_default")]
    pub notifications: BTreeMap<String, VersionNotification>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionNotification {
    pub digest: String,
    pub notified_at: DateTime<Utc>,
    pub image_name: String,
}

impl VersionTracking {
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load, degrading to an empty history on any failure.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(tracking) => tracking,
            Err(e) => {
                warn!("resetting version tracking: {}", e);
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

    pub fn has_notified(&self, image: &str, digest: &str) -> bool {
        self.notifications
            .get(image)
            .is_some_and(|n| n.digest == digest)
    }

    pub fn mark_notified(&mut self, image: &str, digest: &str) {
        self.notifications.insert(
            image.to_string(),
            VersionNotification {
                digest: digest.to_string(),
                notified_at: Utc::now(),
                image_name: image.to_string(),
            },
        );
    }
}
