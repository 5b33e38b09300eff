//! Container identity: deterministic names and labels
//!
//! A container is identified by `(project, worktree)`. The name and label
//! set are pure functions of that pair so repeated invocations find the
//! same container.

pub mod invocation;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const MANAGED_BY_LABEL: &str = "managed-by";
pub const MANAGED_BY: &str = "corral";
pub const LABEL_PROJECT: &str = "corral-project";
pub const LABEL_WORKTREE: &str = "corral-worktree";
pub const LABEL_HOST_PATH: &str = "corral-host-path";
pub const LABEL_LAUNCH_COMMAND: &str = "corral-launch-command";

/// `--filter` value selecting corral-managed containers.
pub fn managed_label_filter() -> String {
    format!("label={}={}", MANAGED_BY_LABEL, MANAGED_BY)
}

/// Container names allow `[a-zA-Z0-9][a-zA-Z0-9_.-]*`; branch separators
/// become dashes and nothing else is transformed.
pub fn sanitize_name(name: &str) -> String {
    name.replace(['/', ':', ' '], "-")
}

pub fn container_name(project_path: &Path, worktree_name: &str) -> String {
    let project = project_basename(project_path);
    format!("{}-{}-{}", MANAGED_BY, project, sanitize_name(worktree_name))
}

pub fn project_basename(project_path: &Path) -> String {
    project_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string())
}

pub fn generate_labels(project: &str, worktree: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
        (LABEL_PROJECT.to_string(), project.to_string()),
        (LABEL_WORKTREE.to_string(), worktree.to_string()),
    ])
}

pub fn generate_labels_with_launch(
    project: &str,
    worktree: &str,
    host_path: &str,
    launch_command: &str,
) -> BTreeMap<String, String> {
    let mut labels = generate_labels(project, worktree);
    labels.insert(LABEL_HOST_PATH.to_string(), host_path.to_string());
    labels.insert(
        LABEL_LAUNCH_COMMAND.to_string(),
        launch_command.to_string(),
    );
    labels
}

pub fn labels_to_args(labels: &BTreeMap<String, String>) -> Vec<String> {
    let mut args = Vec::with_capacity(labels.len() * 2);
    for (key, value) in labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }
    args
}

/// Render labels in the runtime's `k=v,k=v` listing format.
pub fn serialize_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse the runtime's `k=v,k=v` label listing. Values containing commas or
/// equals signs are not representable in this encoding; the launch-command
/// label is documented as lossy for such values.
pub fn parse_label_string(labels: &str) -> BTreeMap<String, String> {
    let mut parsed = BTreeMap::new();
    for pair in labels.split(',') {
        if let Some((key, value)) = pair.split_once('=') {
            parsed.insert(key.to_string(), value.to_string());
        }
    }
    parsed
}

/// A container is managed only when it carries the full identifying set.
pub fn is_managed(labels: &HashMap<String, String>) -> bool {
    labels.get(MANAGED_BY_LABEL).map(String::as_str) == Some(MANAGED_BY)
        && labels.contains_key(LABEL_PROJECT)
        && labels.contains_key(LABEL_WORKTREE)
}

/// Join an argv for display and for the launch-command label, quoting
/// arguments that contain spaces.
pub fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if arg.contains(' ') {
                format!("'{}'", arg)
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
