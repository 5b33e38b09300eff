//! Container runtime adapter
//!
//! Normalizes docker, podman and Apple Container behind one interface.
//! Docker and podman share a CLI surface and differ only in the program
//! name; Apple Container has no label filters, cannot combine `-it` with
//! `-d`, has no `cp`, and its container id equals the container name.

mod apple_container;
mod docker_cli;
pub mod error;

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use enum_dispatch::enum_dispatch;
use tracing::debug;

use crate::config::RuntimeKind;
use crate::container;
pub use apple_container::AppleContainer;
pub use docker_cli::DockerCli;
pub use error::{Result, RuntimeError};

/// Environment variable overriding runtime selection entirely.
pub const RUNTIME_CMD_ENV: &str = "CORRAL_CONTAINER_CMD";

/// A running container as reported by the runtime.
#[derive(Debug, Clone)]
pub struct RunningContainer {
    pub id: String,
    pub name: String,
    pub status: String,
    pub labels: HashMap<String, String>,
}

impl RunningContainer {
    /// Only containers carrying the full corral label set are managed.
    pub fn is_managed(&self) -> bool {
        container::is_managed(&self.labels)
    }
}

/// Capabilities the invocation renderer needs to know about.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeCaps {
    /// Whether `-it` may be combined with `-d`.
    pub detached_tty: bool,
    /// Whether `:ro` mount suffixes are honored.
    pub readonly_mounts: bool,
}

#[enum_dispatch]
pub trait RuntimeInterface {
    fn program(&self) -> &str;

    fn backend_name(&self) -> &'static str;

    fn caps(&self) -> RuntimeCaps;

    /// Run a runtime subcommand, capturing output. Returns stdout on
    /// success; failures carry the captured stderr for error context.
    fn run(&self, args: &[String]) -> Result<String>;

    fn image_exists(&self, image: &str) -> bool;

    /// Resolve an image reference to its immutable image ID.
    fn image_id(&self, image: &str) -> Result<String>;

    fn pull(&self, image: &str) -> Result<()>;

    fn build(&self, dockerfile: &Path, context: &Path, tag: &str) -> Result<()>;

    /// All running containers carrying the `managed-by=corral` label.
    fn list_managed(&self) -> Result<Vec<RunningContainer>>;

    /// The running container with exactly this name, if any.
    fn find_running(&self, name: &str) -> Result<Option<RunningContainer>>;

    /// Resolve a running container's id. Equal to the name on backends
    /// without a separate id space.
    fn container_id(&self, name: &str) -> Result<Option<String>>;

    /// Copy a host file into a container and fix its ownership.
    fn copy_file_in(&self, container: &str, src: &Path, dst: &str, owner: &str) -> Result<()>;

    /// Run a command inside a container, capturing output.
    fn exec_capture(&self, container: &str, argv: &[String]) -> Result<String>;

    fn stop_container(&self, name: &str) -> Result<()>;

    fn remove_container(&self, name: &str, force: bool) -> Result<()>;
}

#[enum_dispatch(RuntimeInterface)]
pub enum ContainerRuntime {
    DockerCli,
    AppleContainer,
}

impl ContainerRuntime {
    fn from_program(program: &str) -> Self {
        if program == "container" {
            AppleContainer::new().into()
        } else {
            DockerCli::new(program).into()
        }
    }

    /// Replace the current process with an interactive `exec` into the
    /// container, handing over the TTY and signal mask. Only returns on
    /// failure.
    pub fn exec_replace(
        &self,
        container: &str,
        workdir: Option<&Path>,
        argv: &[String],
    ) -> RuntimeError {
        use std::os::unix::process::CommandExt;

        let mut cmd = Command::new(self.program());
        cmd.arg("exec").arg("-it");
        if let Some(dir) = workdir {
            cmd.arg("-w").arg(dir);
        }
        cmd.arg(container);
        cmd.args(argv);

        debug!("exec-replacing into {}: {:?}", container, argv);
        RuntimeError::Io(cmd.exec())
    }
}

/// Select the runtime backend: `CORRAL_CONTAINER_CMD` override, then the
/// configured preference, then a PATH scan for docker and podman. Apple
/// Container is never chosen by the scan.
pub fn detect(preference: Option<RuntimeKind>) -> Result<ContainerRuntime> {
    if let Ok(cmd) = std::env::var(RUNTIME_CMD_ENV) {
        if !cmd.is_empty() {
            if which::which(&cmd).is_err() {
                return Err(RuntimeError::PreferredNotFound(cmd));
            }
            return Ok(ContainerRuntime::from_program(&cmd));
        }
    }

    if let Some(kind) = preference {
        let program = kind.program();
        if which::which(program).is_err() {
            return Err(RuntimeError::PreferredNotFound(program.to_string()));
        }
        return Ok(ContainerRuntime::from_program(program));
    }

    for program in ["docker", "podman"] {
        if which::which(program).is_ok() {
            return Ok(ContainerRuntime::from_program(program));
        }
    }

    Err(RuntimeError::RuntimeNotFound)
}

/// Shared subprocess helper: run `program args...`, capture both streams.
pub(crate) fn run_capture(program: &str, args: &[String]) -> Result<std::process::Output> {
    debug!("+ {} {}", program, args.join(" "));
    let output = Command::new(program).args(args).output()?;
    if !output.stderr.is_empty() {
        debug!("{}", String::from_utf8_lossy(&output.stderr).trim_end());
    }
    Ok(output)
}

pub(crate) fn command_failed(program: &str, operation: &str, output: &std::process::Output) -> RuntimeError {
    RuntimeError::CommandFailed {
        program: program.to_string(),
        operation: operation.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}
