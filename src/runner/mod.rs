//! Sandbox orchestration
//!
//! The per-invocation sequence: resolve the worktree, resolve the dev
//! container, ensure the image and its user, derive the container identity,
//! then reconnect to a running container or create a fresh one, finish
//! post-start setup, and hand the terminal over with a process-replacing
//! exec.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Config, Credentials};
use crate::container::{self, invocation::MountEnvPlanner};
use crate::credentials;
use crate::devcontainer::{self, user_detect, DevContainerError, DevContainerSpec, UserDetector};
use crate::git::{self, error::GitError};
use crate::paths;
use crate::runtime::{self, ContainerRuntime, RunningContainer, RuntimeError, RuntimeInterface};

/// Worktree name used when a project runs without one.
pub const NO_WORKTREE: &str = "no-worktree";

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("{0}")]
    Conflict(Box<ContainerConflict>),

    #[error("failed to create container: {0}")]
    CreateFailed(String),

    #[error("post-start setup failed: {0}")]
    PostStartSetup(String),

    #[error("--worktree specified but {0} is not a git repository")]
    NotAGitRepo(PathBuf),

    #[error("no running container found for worktree '{0}'")]
    NoRunningContainer(String),

    #[error("unknown environment config '{0}' (see 'corral configure')")]
    UnknownEnvConfig(String),

    #[error("could not determine home directory")]
    NoHome,

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    DevContainer(#[from] DevContainerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// Everything the orchestrator needs for one `run` invocation.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub path: Option<PathBuf>,
    pub worktree: Option<String>,
    pub no_worktree: bool,
    pub env: Vec<String>,
    pub env_config: Option<String>,
    pub credentials: Credentials,
    pub publish_ports: Vec<String>,
    pub reconnect: bool,
    pub verbose: bool,
    /// The original command line, recorded in the launch-command label.
    pub launch_command: String,
    pub command: Vec<String>,
}

/// Details of the running container an invocation collided with, plus the
/// two concrete commands that resolve the situation.
#[derive(Debug, Clone)]
pub struct ContainerConflict {
    pub name: String,
    pub status: String,
    pub project: String,
    pub worktree: String,
    pub host_path: String,
    pub launch_command: String,
    pub reconnect_command: String,
    pub stop_command: String,
}

impl fmt::Display for ContainerConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "container already running for this worktree")?;
        writeln!(f)?;
        writeln!(f, "Container Details:")?;
        writeln!(f, "  Name: {}", self.name)?;
        writeln!(f, "  Status: {}", self.status)?;
        writeln!(f, "  Project: {}", self.project)?;
        writeln!(f, "  Worktree: {}", self.worktree)?;
        if !self.host_path.is_empty() {
            writeln!(f, "  Host Path: {}", self.host_path)?;
        }
        if !self.launch_command.is_empty() {
            writeln!(f, "  Original Command: {}", self.launch_command)?;
        }
        writeln!(f)?;
        writeln!(f, "To run your command in the existing container:")?;
        writeln!(f, "  {}", self.reconnect_command)?;
        writeln!(f)?;
        writeln!(f, "To stop the existing container:")?;
        write!(f, "  {}", self.stop_command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeContext {
    pub name: String,
    pub mount_path: PathBuf,
    pub main_repo_git_dir: Option<PathBuf>,
}

/// Decide which directory gets mounted and under which worktree name.
///
/// Outside a git repository (or with `no_worktree`) the project directory is
/// used directly. Inside one, the branch (or the explicit worktree flag)
/// selects an existing worktree or creates a new one under the data
/// directory.
pub fn resolve_worktree(
    work_dir: &Path,
    worktree: Option<&str>,
    no_worktree: bool,
) -> Result<WorktreeContext> {
    if no_worktree {
        return Ok(WorktreeContext {
            name: NO_WORKTREE.to_string(),
            mount_path: work_dir.to_path_buf(),
            main_repo_git_dir: None,
        });
    }

    if !git::is_repo(work_dir) {
        if worktree.is_some() {
            return Err(RunnerError::NotAGitRepo(work_dir.to_path_buf()));
        }
        return Ok(WorktreeContext {
            name: NO_WORKTREE.to_string(),
            mount_path: work_dir.to_path_buf(),
            main_repo_git_dir: None,
        });
    }

    let name = match worktree {
        Some(name) => name.to_string(),
        None => git::current_branch(work_dir)?,
    };

    let mount_path = match git::worktree_path_of(work_dir, &name)? {
        Some(existing) => {
            debug!("using existing worktree at {}", existing.display());
            existing
        }
        None => {
            let path = git::worktree_path_for(work_dir, &name)?;
            debug!("creating worktree at {}", path.display());
            git::create_worktree(work_dir, &path, &name)?;
            path
        }
    };

    Ok(WorktreeContext {
        name,
        mount_path,
        main_repo_git_dir: Some(git::main_repo_git_dir(work_dir)),
    })
}

/// Resolve the image for a spec: build the project's devcontainer image when
/// a Dockerfile is named, otherwise pull the referenced image on miss.
pub fn ensure_image(
    runtime: &ContainerRuntime,
    spec: &DevContainerSpec,
    mount_path: &Path,
    project_name: &str,
) -> Result<String> {
    if !spec.dockerfile.is_empty() {
        let tag = devcontainer_image_tag(project_name);
        if !runtime.image_exists(&tag) {
            eprintln!("Building image from {}...", spec.dockerfile);
            let dockerfile = mount_path.join(".devcontainer").join(&spec.dockerfile);
            let context = mount_path.join(".devcontainer");
            runtime.build(&dockerfile, &context, &tag)?;
        }
        return Ok(tag);
    }

    if !runtime.image_exists(&spec.image) {
        eprintln!("Pulling image {}...", spec.image);
        runtime.pull(&spec.image)?;
    }
    Ok(spec.image.clone())
}

pub fn devcontainer_image_tag(project_name: &str) -> String {
    format!("corral-{}-devcontainer:latest", project_name)
}

fn conflict_for(
    existing: &RunningContainer,
    worktree_name: &str,
    current_dir: Option<&Path>,
    command: &[String],
) -> ContainerConflict {
    let label = |key: &str| {
        existing
            .labels
            .get(key)
            .cloned()
            .unwrap_or_default()
    };
    let host_path = label(container::LABEL_HOST_PATH);

    // A --worktree flag in the recovery command is redundant when the user
    // is already sitting in the container's host path.
    let needs_worktree_flag = match current_dir {
        Some(dir) if !host_path.is_empty() => dir != Path::new(&host_path),
        _ => true,
    };
    let worktree_flag = if needs_worktree_flag && worktree_name != NO_WORKTREE {
        format!(" --worktree={}", worktree_name)
    } else {
        String::new()
    };

    ContainerConflict {
        name: existing.name.clone(),
        status: existing.status.clone(),
        project: label(container::LABEL_PROJECT),
        worktree: label(container::LABEL_WORKTREE),
        host_path,
        launch_command: label(container::LABEL_LAUNCH_COMMAND),
        reconnect_command: format!(
            "corral run{} --reconnect {}",
            worktree_flag,
            container::shell_join(command)
        ),
        stop_command: format!("corral stop {}", existing.name),
    }
}

/// Post-start setup inside the freshly created container. Any failure here
/// rolls the container back.
fn post_start_setup(
    runtime: &ContainerRuntime,
    container_id: &str,
    mount_path: &Path,
    home: &Path,
    remote_user: &str,
    overlay_engaged: bool,
) -> Result<()> {
    // The worktree mount needs its parent chain inside the container.
    if let Some(parent) = mount_path.parent() {
        if parent != Path::new("/") && parent != Path::new("") {
            runtime
                .exec_capture(
                    container_id,
                    &[
                        "mkdir".to_string(),
                        "-p".to_string(),
                        parent.display().to_string(),
                    ],
                )
                .map_err(|e| RunnerError::PostStartSetup(e.to_string()))?;
        }
    }

    let claude_json = home.join(".claude.json");
    if claude_json.exists() {
        let dst = format!("/home/{}/.claude.json", remote_user);
        match runtime.copy_file_in(container_id, &claude_json, &dst, remote_user) {
            Ok(()) => {}
            Err(RuntimeError::UnsupportedByBackend { backend, .. }) => {
                warn!(".claude.json copy skipped: unsupported by {}", backend);
                eprintln!(
                    "Warning: {} cannot copy files into containers; ~/.claude.json not seeded",
                    backend
                );
            }
            Err(e) => return Err(RunnerError::PostStartSetup(e.to_string())),
        }
    }

    // The overlay bind-mount delivers the shared credential file; settle its
    // ownership and mode for the container user.
    if overlay_engaged {
        let target = format!("/home/{}/.claude/.credentials.json", remote_user);
        runtime
            .exec_capture(
                container_id,
                &[
                    "sh".to_string(),
                    "-c".to_string(),
                    format!(
                        "chown {user}:{user} {target} && chmod 600 {target}",
                        user = remote_user,
                        target = target
                    ),
                ],
            )
            .map_err(|e| RunnerError::PostStartSetup(e.to_string()))?;
    }

    Ok(())
}

/// Run the full orchestration sequence. On success this call never returns:
/// the process image is replaced by the interactive container exec.
pub fn run(config: &Config, req: RunRequest) -> Result<()> {
    // Step 1: working directory.
    let work_dir = match &req.path {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    let work_dir = absolutize(&work_dir)?;

    // Step 2: worktree context.
    let wt = resolve_worktree(&work_dir, req.worktree.as_deref(), req.no_worktree)?;
    if req.verbose {
        eprintln!("Mounting {} as worktree '{}'", wt.mount_path.display(), wt.name);
    }

    // Steps 3-5: dev container spec, image, user.
    let runtime = runtime::detect(config.runtime_preference())?;
    let mut detector = UserDetector::new();
    let mut spec = match devcontainer::load(&wt.mount_path, &runtime, &mut detector)? {
        Some(spec) => spec,
        None => devcontainer::default_spec(
            &config.effective_default_image(),
            &runtime,
            &mut detector,
        ),
    };

    let project_name = container::project_basename(&work_dir);
    let image = ensure_image(&runtime, &spec, &wt.mount_path, &project_name)?;
    // A Dockerfile-only spec has no user until the image exists to probe.
    if spec.remote_user.is_empty() {
        spec.remote_user = detector.resolve(&runtime, &image);
    }
    user_detect::validate_user(&runtime, &image, &spec.remote_user)?;

    // Step 6: identity.
    let name = container::container_name(&work_dir, &wt.name);
    let labels = container::generate_labels_with_launch(
        &project_name,
        &wt.name,
        &work_dir.display().to_string(),
        &req.launch_command,
    );

    // Step 7: branch on an already-running container.
    if let Some(existing) = runtime.find_running(&name)? {
        if !req.reconnect {
            let current_dir = std::env::current_dir().ok();
            return Err(RunnerError::Conflict(Box::new(conflict_for(
                &existing,
                &wt.name,
                current_dir.as_deref(),
                &req.command,
            ))));
        }

        if req.verbose {
            eprintln!("Reconnecting to existing container {}", name);
        }
        let id = runtime.container_id(&name)?.unwrap_or_else(|| name.clone());
        // The recorded host path wins over the current resolution; mounts
        // and environment stay exactly as the container was created.
        let recorded = existing
            .labels
            .get(container::LABEL_HOST_PATH)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        let exec_dir = recorded.as_deref().unwrap_or(&work_dir);
        return Err(runtime.exec_replace(&id, Some(exec_dir), &req.command).into());
    }

    // A stopped container with the same name blocks creation; removal
    // failures mean it was already absent.
    let _ = runtime.remove_container(&name, false);

    // Step 8: credential plan and invocation.
    let home = paths::home_dir().ok_or(RunnerError::NoHome)?;
    let host_env: BTreeMap<String, String> = std::env::vars().collect();
    let plan = credentials::build_plan(&home, req.credentials, &host_env);

    let env_config_vars = match &req.env_config {
        Some(key) => {
            let entry = config
                .env_configs
                .get(key)
                .ok_or_else(|| RunnerError::UnknownEnvConfig(key.clone()))?;
            entry
                .env_vars
                .iter()
                .map(|(k, v)| {
                    let expanded =
                        crate::config::expand_host_vars(v, |name| host_env.get(name).cloned());
                    (k.clone(), expanded)
                })
                .collect()
        }
        None => Vec::new(),
    };

    let pass_through = config.pass_through_vars();
    let planner = MountEnvPlanner {
        home: &home,
        remote_user: &spec.remote_user,
        mount_path: &wt.mount_path,
        main_repo_git_dir: wt.main_repo_git_dir.as_deref(),
        plan: &plan,
        pass_through_vars: &pass_through,
        env_config_vars: &env_config_vars,
        user_env: &req.env,
        ports: &req.publish_ports,
        image: &image,
        container_name: &name,
        labels,
        host_env: &host_env,
    };
    let invocation = planner.plan();

    // Step 9: start detached with a keepalive; the user-visible shell comes
    // from the exec below.
    let args = invocation.to_run_args(runtime.caps());
    if req.verbose {
        eprintln!("Starting container {}", name);
        eprintln!("+ {} {}", runtime.program(), args.join(" "));
    }
    let output = runtime
        .run(&args)
        .map_err(|e| RunnerError::CreateFailed(e.to_string()))?;
    let container_id = output.trim().to_string();
    let container_id = if container_id.is_empty() {
        name.clone()
    } else {
        container_id
    };

    // Step 10: in-container setup, rolling back on failure.
    if let Err(e) = post_start_setup(
        &runtime,
        &container_id,
        &wt.mount_path,
        &home,
        &spec.remote_user,
        plan.claude_overlay.is_some(),
    ) {
        let _ = runtime.remove_container(&container_id, true);
        return Err(e);
    }

    // Step 11: hand the terminal over.
    Err(runtime
        .exec_replace(&container_id, Some(&wt.mount_path), &req.command)
        .into())
}

/// Stop and remove one managed container.
pub fn stop_container(runtime: &ContainerRuntime, name: &str) -> Result<()> {
    println!("Stopping container {}...", name);
    runtime.stop_container(name)?;
    runtime.remove_container(name, false)?;
    println!("Container {} stopped and removed", name);
    Ok(())
}

fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
