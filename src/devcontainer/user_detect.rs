//! Remote user detection
//!
//! When a dev container spec names no user, a throwaway container answers
//! `whoami`. Results are cached per image ID so repeated invocations against
//! the same image skip the probe.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::{DevContainerError, Result};
use crate::runtime::{ContainerRuntime, RuntimeInterface};

pub struct UserDetector {
    /// image ID -> detected user
    cache: HashMap<String, String>,
}

impl Default for UserDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl UserDetector {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Detect the default user of an image, falling back to `root` when the
    /// probe fails.
    pub fn resolve(&mut self, runtime: &ContainerRuntime, image: &str) -> String {
        let cache_key = match runtime.image_id(image) {
            Ok(id) => id,
            Err(_) => image.to_string(),
        };

        if let Some(user) = self.cache.get(&cache_key) {
            return user.clone();
        }

        let user = match probe_user(runtime, image) {
            Ok(user) => user,
            Err(e) => {
                warn!("user detection failed for {}: {}; assuming root", image, e);
                "root".to_string()
            }
        };

        self.cache.insert(cache_key, user.clone());
        user
    }
}

/// Run a disposable container that prints the default user and its home.
fn probe_user(runtime: &ContainerRuntime, image: &str) -> Result<String> {
    let args: Vec<String> = ["run", "--rm", "--entrypoint", "sh", image, "-c"]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once("whoami && echo $HOME".to_string()))
        .collect();

    let output = runtime.run(&args)?;
    let user = output
        .lines()
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if user.is_empty() {
        return Err(DevContainerError::Runtime(
            crate::runtime::RuntimeError::UnexpectedOutput {
                program: runtime.program().to_string(),
                detail: "empty whoami probe output".to_string(),
            },
        ));
    }
    debug!("detected user '{}' for image {}", user, image);
    Ok(user)
}

/// Verify the resolved user actually exists in the image. Runs after image
/// presence is confirmed; failure carries remediation guidance.
pub fn validate_user(runtime: &ContainerRuntime, image: &str, user: &str) -> Result<()> {
    let args: Vec<String> = ["run", "--rm", "--entrypoint", "sh", image, "-c"]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(format!("id -u {}", user)))
        .collect();

    match runtime.run(&args) {
        Ok(_) => Ok(()),
        Err(_) => Err(DevContainerError::UserNotInImage {
            user: user.to_string(),
            image: image.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_not_in_image_message_lists_remediation() {
        let err = DevContainerError::UserNotInImage {
            user: "vscode".into(),
            image: "ubuntu:22.04".into(),
        };
        let message = err.to_string();
        assert!(message.contains("vscode"));
        assert!(message.contains("ubuntu:22.04"));
        assert!(message.contains("remoteUser"));
        assert!(message.contains("custom image"));
    }

    #[test]
    fn test_detector_caches_by_key() {
        let mut detector = UserDetector::new();
        detector.cache.insert("sha256:abc".into(), "node".into());
        // A cache hit answers without touching the runtime.
        assert_eq!(detector.cache.get("sha256:abc").unwrap(), "node");
    }
}
