//! Docker-compatible CLI backend (docker and podman)

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use super::error::{Result, RuntimeError};
use super::{command_failed, run_capture, RunningContainer, RuntimeCaps, RuntimeInterface};
use crate::container;

/// docker and podman accept the same flags; only the program name differs.
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    fn run_args(&self, operation: &str, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let output = run_capture(&self.program, &args)?;
        if !output.status.success() {
            return Err(command_failed(&self.program, operation, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn ps_json(&self, filters: &[String]) -> Result<Vec<PsLine>> {
        let mut args = vec!["ps".to_string()];
        for filter in filters {
            args.push("--filter".to_string());
            args.push(filter.clone());
        }
        args.push("--format".to_string());
        args.push("{{json .}}".to_string());

        let output = run_capture(&self.program, &args)?;
        if !output.status.success() {
            return Err(command_failed(&self.program, "ps", &output));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = Vec::new();
        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<PsLine>(line) {
                Ok(parsed) => lines.push(parsed),
                Err(e) => warn!("skipping unparseable ps line: {}", e),
            }
        }
        Ok(lines)
    }
}

#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

impl PsLine {
    fn into_container(self) -> RunningContainer {
        let labels: HashMap<String, String> = container::parse_label_string(&self.labels)
            .into_iter()
            .collect();
        RunningContainer {
            id: self.id,
            name: self.names,
            status: self.status,
            labels,
        }
    }
}

impl RuntimeInterface for DockerCli {
    fn program(&self) -> &str {
        &self.program
    }

    fn backend_name(&self) -> &'static str {
        if self.program == "podman" {
            "podman"
        } else {
            "docker"
        }
    }

    fn caps(&self) -> RuntimeCaps {
        RuntimeCaps {
            detached_tty: true,
            readonly_mounts: true,
        }
    }

    fn run(&self, args: &[String]) -> Result<String> {
        let output = run_capture(&self.program, args)?;
        if !output.status.success() {
            let operation = args.first().map(String::as_str).unwrap_or("run");
            return Err(command_failed(&self.program, operation, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn image_exists(&self, image: &str) -> bool {
        self.run_args("image inspect", &["image", "inspect", image])
            .is_ok()
    }

    fn image_id(&self, image: &str) -> Result<String> {
        let output = self.run_args(
            "image inspect",
            &["image", "inspect", "--format", "{{.Id}}", image],
        )?;
        Ok(output.trim().to_string())
    }

    fn pull(&self, image: &str) -> Result<()> {
        let args: Vec<String> = vec!["pull".into(), image.into()];
        let output = run_capture(&self.program, &args)?;
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
        let output = run_capture(&self.program, &args)?;
        if !output.status.success() {
            return Err(RuntimeError::ImageUnavailable {
                image: tag.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn list_managed(&self) -> Result<Vec<RunningContainer>> {
        let lines = self.ps_json(&[container::managed_label_filter()])?;
        Ok(lines
            .into_iter()
            .map(PsLine::into_container)
            .filter(RunningContainer::is_managed)
            .collect())
    }

    fn find_running(&self, name: &str) -> Result<Option<RunningContainer>> {
        // The name filter matches substrings; compare exactly afterwards.
        let lines = self.ps_json(&[format!("name={}", name)])?;
        Ok(lines
            .into_iter()
            .map(PsLine::into_container)
            .find(|c| c.name == name))
    }

    fn container_id(&self, name: &str) -> Result<Option<String>> {
        Ok(self.find_running(name)?.map(|c| c.id))
    }

    fn copy_file_in(&self, container: &str, src: &Path, dst: &str, owner: &str) -> Result<()> {
        if let Some(parent) = std::path::Path::new(dst).parent() {
            self.exec_capture(
                container,
                &[
                    "mkdir".to_string(),
                    "-p".to_string(),
                    parent.display().to_string(),
                ],
            )?;
        }

        self.run_args(
            "cp",
            &[
                "cp",
                &src.display().to_string(),
                &format!("{}:{}", container, dst),
            ],
        )?;

        // cp writes as root; only the copied file is chowned since the
        // surrounding directory may hold read-only mounts.
        let chown = self.run_args(
            "exec",
            &[
                "exec",
                "-u",
                "root",
                container,
                "chown",
                &format!("{}:{}", owner, owner),
                dst,
            ],
        );
        if let Err(e) = chown {
            warn!("failed to fix ownership of {}: {}", dst, e);
        }

        Ok(())
    }

    fn exec_capture(&self, container: &str, argv: &[String]) -> Result<String> {
        let mut args = vec!["exec".to_string(), container.to_string()];
        args.extend_from_slice(argv);
        let output = run_capture(&self.program, &args)?;
        if !output.status.success() {
            return Err(command_failed(&self.program, "exec", &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn stop_container(&self, name: &str) -> Result<()> {
        self.run_args("stop", &["stop", name]).map(|_| ())
    }

    fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        if force {
            self.run_args("rm", &["rm", "-f", name]).map(|_| ())
        } else {
            self.run_args("rm", &["rm", name]).map(|_| ())
        }
    }
}
