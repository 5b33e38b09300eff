//! Apple Container backend
//!
//! The `container` CLI has no `--filter`, so `ps` output is parsed as a JSON
//! array and filtered here. The container id equals the container name,
//! `-it` cannot be combined with `-d`, read-only mount suffixes are ignored,
//! and there is no `cp` subcommand.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use super::error::{Result, RuntimeError};
use super::{command_failed, run_capture, RunningContainer, RuntimeCaps, RuntimeInterface};

const PROGRAM: &str = "container";

#[derive(Default)]
pub struct AppleContainer;

impl AppleContainer {
    pub fn new() -> Self {
        Self
    }

    fn run_args(&self, operation: &str, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let output = run_capture(PROGRAM, &args)?;
        if !output.status.success() {
            return Err(command_failed(PROGRAM, operation, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// All running containers, parsed from `ps --format json`.
    fn list_all(&self) -> Result<Vec<RunningContainer>> {
        let output = self.run_args("ps", &["ps", "--format", "json"])?;
        let parsed: Value =
            serde_json::from_str(output.trim()).map_err(|e| RuntimeError::UnexpectedOutput {
                program: PROGRAM.to_string(),
                detail: e.to_string(),
            })?;

        let entries = parsed.as_array().cloned().unwrap_or_default();
        let mut containers = Vec::new();
        for entry in entries {
            let Some(id) = string_at(&entry, &["id"]).or_else(|| string_at(&entry, &["configuration", "id"]))
            else {
                continue;
            };
            let status = string_at(&entry, &["status"]).unwrap_or_default();
            let labels = labels_at(&entry);
            containers.push(RunningContainer {
                // Container name and id are the same thing on this backend.
                name: id.clone(),
                id,
                status,
                labels,
            });
        }
        Ok(containers)
    }
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().map(|s| s.to_string())
}

fn labels_at(value: &Value) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    if let Some(map) = value
        .pointer("/configuration/labels")
        .and_then(Value::as_object)
    {
        for (k, v) in map {
            if let Some(s) = v.as_str() {
                labels.insert(k.clone(), s.to_string());
            }
        }
    }
    labels
}

impl RuntimeInterface for AppleContainer {
    fn program(&self) -> &str {
        PROGRAM
    }

    fn backend_name(&self) -> &'static str {
        "apple-container"
    }

    fn caps(&self) -> RuntimeCaps {
        RuntimeCaps {
            detached_tty: false,
            readonly_mounts: false,
        }
    }

    fn run(&self, args: &[String]) -> Result<String> {
        let output = run_capture(PROGRAM, args)?;
        if !output.status.success() {
            let operation = args.first().map(String::as_str).unwrap_or("run");
            return Err(command_failed(PROGRAM, operation, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn image_exists(&self, image: &str) -> bool {
        self.run_args("image inspect", &["image", "inspect", image])
            .is_ok()
    }

    fn image_id(&self, image: &str) -> Result<String> {
        // No --format support; the image reference has to stand in for an id.
        self.run_args("image inspect", &["image", "inspect", image])?;
        Ok(image.to_string())
    }

    fn pull(&self, image: &str) -> Result<()> {
        let args: Vec<String> = vec!["image".into(), "pull".into(), image.into()];
        let output = run_capture(PROGRAM, &args)?;
        if !output.status.success() {
            return Err(RuntimeError::ImageUnavailable {
                image: image.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn build(&self, dockerfile: &Path, context: &Path, tag: &str) -> Result<()> {
        let args: Vec<String> = vec![
            "build".into(),
            "-f".into(),
            dockerfile.display().to_string(),
            "-t".into(),
            tag.into(),
            context.display().to_string(),
        ];
        let output = run_capture(PROGRAM, &args)?;
        if !output.status.success() {
            return Err(RuntimeError::ImageUnavailable {
                image: tag.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn list_managed(&self) -> Result<Vec<RunningContainer>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(RunningContainer::is_managed)
            .collect())
    }

    fn find_running(&self, name: &str) -> Result<Option<RunningContainer>> {
        Ok(self
            .list_all()?
            .into_iter()
            .find(|c| c.name == name && c.status == "running"))
    }

    fn container_id(&self, name: &str) -> Result<Option<String>> {
        Ok(self.find_running(name)?.map(|c| c.id))
    }

    fn copy_file_in(&self, _container: &str, _src: &Path, _dst: &str, _owner: &str) -> Result<()> {
        Err(RuntimeError::UnsupportedByBackend {
            backend: "apple-container",
            operation: "copying files into a running container",
        })
    }

    fn exec_capture(&self, container: &str, argv: &[String]) -> Result<String> {
        let mut args = vec!["exec".to_string(), container.to_string()];
        args.extend_from_slice(argv);
        let output = run_capture(PROGRAM, &args)?;
        if !output.status.success() {
            return Err(command_failed(PROGRAM, "exec", &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn stop_container(&self, name: &str) -> Result<()> {
        self.run_args("stop", &["stop", name]).map(|_| ())
    }

    fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        if force {
            self.run_args("delete", &["delete", "-f", name]).map(|_| ())
        } else {
            self.run_args("delete", &["delete", name]).map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_at_reads_configuration_labels() {
        let entry: Value = serde_json::from_str(
            r#"{
                "id": "corral-proj-main",
                "status": "running",
                "configuration": {
                    "labels": {
                        "managed-by": "corral",
                        "corral-project": "proj",
                        "corral-worktree": "main"
                    }
                }
            }"#,
        )
        .unwrap();
        let labels = labels_at(&entry);
        assert_eq!(labels["managed-by"], "corral");
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn test_string_at_missing_path() {
        let entry: Value = serde_json::from_str(r#"{"status": "running"}"#).unwrap();
        assert_eq!(string_at(&entry, &["id"]), None);
        assert_eq!(string_at(&entry, &["status"]), Some("running".into()));
    }

    #[test]
    fn test_copy_file_in_unsupported() {
        let backend = AppleContainer::new();
        let result = backend.copy_file_in("c", Path::new("/tmp/x"), "/tmp/y", "user");
        assert!(matches!(
            result,
            Err(RuntimeError::UnsupportedByBackend { .. })
        ));
    }
}
