//! Mount and environment planning
//!
//! Turns a credential plan plus worktree and image data into a fully
//! resolved container invocation. Mount and environment ordering is
//! deterministic; the `.claude` directory mount must precede the credential
//! overlay mount for the overlay to take effect.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::credentials::CredentialPlan;
use crate::runtime::RuntimeCaps;

/// Terminal and locale variables forwarded from the host; nothing else of
/// the host environment leaks in implicitly.
pub const SAFE_ENV_VARS: &[&str] = &["TERM", "LANG", "LC_ALL", "LC_CTYPE", "LC_MESSAGES", "COLORTERM"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

impl Mount {
    fn rw(host_path: PathBuf, container_path: String) -> Self {
        Self {
            host_path,
            container_path,
            read_only: false,
        }
    }

    fn ro(host_path: PathBuf, container_path: String) -> Self {
        Self {
            host_path,
            container_path,
            read_only: true,
        }
    }
}

/// A fully resolved `run` argument vector plus metadata for follow-up
/// operations.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub container_name: String,
    pub labels: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
    pub env: Vec<(String, String)>,
    pub ports: Vec<String>,
    pub image: String,
    pub working_dir: PathBuf,
    pub detached: bool,
    pub interactive: bool,
    pub keepalive: Vec<String>,
}

impl Invocation {
    /// Render the `run` argument vector for a backend with the given
    /// capabilities.
    pub fn to_run_args(&self, caps: RuntimeCaps) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        if self.detached {
            args.push("-d".to_string());
        }
        if self.interactive && (caps.detached_tty || !self.detached) {
            args.push("-it".to_string());
        }

        args.extend(super::labels_to_args(&self.labels));
        args.push("--name".to_string());
        args.push(self.container_name.clone());

        for mount in &self.mounts {
            let mut spec = format!(
                "{}:{}",
                mount.host_path.display(),
                mount.container_path
            );
            if mount.read_only {
                if caps.readonly_mounts {
                    spec.push_str(":ro");
                } else {
                    warn!(
                        "backend does not support read-only mounts; mounting {} read-write",
                        mount.host_path.display()
                    );
                }
            }
            args.push("-v".to_string());
            args.push(spec);
        }

        args.push("-w".to_string());
        args.push(self.working_dir.display().to_string());

        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        for port in &self.ports {
            args.push("-p".to_string());
            args.push(port.clone());
        }

        args.push(self.image.clone());
        args.extend(self.keepalive.iter().cloned());
        args
    }
}

/// Inputs to the planner. The host environment is an explicit snapshot so
/// planning stays a pure function.
pub struct MountEnvPlanner<'a> {
    pub home: &'a Path,
    pub remote_user: &'a str,
    pub mount_path: &'a Path,
    pub main_repo_git_dir: Option<&'a Path>,
    pub plan: &'a CredentialPlan,
    pub pass_through_vars: &'a [String],
    pub env_config_vars: &'a [(String, String)],
    pub user_env: &'a [String],
    pub ports: &'a [String],
    pub image: &'a str,
    pub container_name: &'a str,
    pub labels: BTreeMap<String, String>,
    pub host_env: &'a BTreeMap<String, String>,
}

impl MountEnvPlanner<'_> {
    fn container_home(&self, rel: &str) -> String {
        format!("/home/{}/{}", self.remote_user, rel)
    }

    /// Dereference symlinks so the runtime never mounts a dangling link.
    fn resolved(&self, path: &Path) -> PathBuf {
        match path.canonicalize() {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("failed to resolve {}: {}", path.display(), e);
                path.to_path_buf()
            }
        }
    }

    fn build_mounts(&self) -> Vec<Mount> {
        let mut mounts = Vec::new();

        // The .claude directory needs write access for plugins and state;
        // the overlay file mount must come immediately after it so the
        // shared credential file shadows the directory's entry.
        mounts.push(Mount::rw(
            self.home.join(".claude"),
            self.container_home(".claude"),
        ));
        if let Some(overlay) = &self.plan.claude_overlay {
            mounts.push(Mount::rw(
                overlay.clone(),
                self.container_home(".claude/.credentials.json"),
            ));
        }

        // Worktree at its host path, preserving absolute paths on both sides.
        mounts.push(Mount::rw(
            self.mount_path.to_path_buf(),
            self.mount_path.display().to_string(),
        ));

        for dir in &self.plan.agent_config_dirs {
            mounts.push(Mount::rw(self.home.join(dir), self.container_home(dir)));
        }

        // The worktree's .git file points at the main repository; mounting
        // that directory at its real path keeps the pointer valid.
        if let Some(git_dir) = self.main_repo_git_dir {
            mounts.push(Mount::rw(
                git_dir.to_path_buf(),
                git_dir.display().to_string(),
            ));
        }

        let creds = &self.plan.credentials;
        if creds.git {
            let gitconfig = self.home.join(".gitconfig");
            if gitconfig.exists() {
                mounts.push(Mount::ro(
                    self.resolved(&gitconfig),
                    self.container_home(".gitconfig"),
                ));
            }
        }
        if creds.ssh {
            let ssh = self.home.join(".ssh");
            if ssh.exists() {
                mounts.push(Mount::ro(self.resolved(&ssh), self.container_home(".ssh")));
            }
        }
        if creds.gh {
            let gh = self.home.join(".config/gh");
            if gh.exists() {
                mounts.push(Mount::ro(
                    self.resolved(&gh),
                    self.container_home(".config/gh"),
                ));
            }
        }
        if creds.gpg {
            let gnupg = self.home.join(".gnupg");
            if gnupg.exists() {
                mounts.push(Mount::ro(
                    self.resolved(&gnupg),
                    self.container_home(".gnupg"),
                ));
            }
        }
        if creds.npm {
            let npmrc = self.home.join(".npmrc");
            if npmrc.exists() {
                mounts.push(Mount::ro(
                    self.resolved(&npmrc),
                    self.container_home(".npmrc"),
                ));
            }
        }

        // Read-write so SSO token refresh and CLI caching keep working.
        if creds.aws {
            let aws = self.home.join(".aws");
            if aws.exists() {
                mounts.push(Mount::rw(aws, self.container_home(".aws")));
            }
        }

        mounts
    }

    fn build_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();

        for key in SAFE_ENV_VARS {
            if let Some(value) = self.host_env.get(*key).filter(|v| !v.is_empty()) {
                env.push((key.to_string(), value.clone()));
            }
        }

        // The container user's home, never the host's.
        env.push(("HOME".to_string(), format!("/home/{}", self.remote_user)));
        env.push(("IS_SANDBOX".to_string(), "1".to_string()));

        for key in self.pass_through_vars {
            if let Some(value) = self.host_env.get(key).filter(|v| !v.is_empty()) {
                env.push((key.clone(), value.clone()));
            }
        }

        if self.plan.credentials.aws {
            env.extend(self.plan.aws_env.iter().cloned());
        }

        env.extend(self.env_config_vars.iter().cloned());

        // User --env flags last so they can override anything above.
        for entry in self.user_env {
            match entry.split_once('=') {
                Some((key, value)) => env.push((key.to_string(), value.to_string())),
                None => {
                    if let Some(value) = self.host_env.get(entry).filter(|v| !v.is_empty()) {
                        env.push((entry.clone(), value.clone()));
                    }
                }
            }
        }

        env
    }

    pub fn plan(&self) -> Invocation {
        Invocation {
            container_name: self.container_name.to_string(),
            labels: self.labels.clone(),
            mounts: self.build_mounts(),
            env: self.build_env(),
            ports: self.ports.to_vec(),
            image: self.image.to_string(),
            working_dir: self.mount_path.to_path_buf(),
            detached: true,
            interactive: true,
            keepalive: vec!["sleep".to_string(), "infinity".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::container::generate_labels;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        home: TempDir,
        mount_path: PathBuf,
        plan: CredentialPlan,
        host_env: BTreeMap<String, String>,
    }

    impl Fixture {
        fn new() -> Self {
            let home = TempDir::new().unwrap();
            fs::create_dir_all(home.path().join(".claude")).unwrap();
            Self {
                mount_path: home.path().join("work/project"),
                home,
                plan: CredentialPlan::default(),
                host_env: BTreeMap::from([("TERM".to_string(), "xterm-256color".to_string())]),
            }
        }

        fn planner(&self) -> MountEnvPlanner<'_> {
            MountEnvPlanner {
                home: self.home.path(),
                remote_user: "vscode",
                mount_path: &self.mount_path,
                main_repo_git_dir: None,
                plan: &self.plan,
                pass_through_vars: &[],
                env_config_vars: &[],
                user_env: &[],
                ports: &[],
                image: "example:latest",
                container_name: "corral-project-main",
                labels: generate_labels("project", "main"),
                host_env: &self.host_env,
            }
        }
    }

    fn caps() -> RuntimeCaps {
        RuntimeCaps {
            detached_tty: true,
            readonly_mounts: true,
        }
    }

    #[test]
    fn test_worktree_identity_mount_and_working_dir() {
        let fx = Fixture::new();
        let invocation = fx.planner().plan();

        let identity = invocation
            .mounts
            .iter()
            .find(|m| m.host_path == fx.mount_path)
            .expect("worktree mount present");
        assert_eq!(identity.container_path, fx.mount_path.display().to_string());
        assert!(!identity.read_only);
        assert_eq!(invocation.working_dir, fx.mount_path);
    }

    #[test]
    fn test_claude_mount_precedes_overlay_precedes_worktree() {
        let mut fx = Fixture::new();
        let overlay = fx.home.path().join("shared-creds.json");
        fs::write(&overlay, "{}").unwrap();
        fx.plan.claude_overlay = Some(overlay.clone());

        let invocation = fx.planner().plan();
        assert!(invocation.mounts[0]
            .container_path
            .ends_with("/.claude"));
        assert_eq!(invocation.mounts[1].host_path, overlay);
        assert!(invocation.mounts[1]
            .container_path
            .ends_with("/.claude/.credentials.json"));
        assert_eq!(invocation.mounts[2].host_path, fx.mount_path);
    }

    #[test]
    fn test_env_begins_with_terminal_vars_and_single_home_sandbox() {
        let mut fx = Fixture::new();
        fx.host_env
            .insert("LANG".to_string(), "en_US.UTF-8".to_string());
        let invocation = fx.planner().plan();

        assert_eq!(invocation.env[0], ("TERM".into(), "xterm-256color".into()));
        assert_eq!(invocation.env[1], ("LANG".into(), "en_US.UTF-8".into()));
        assert_eq!(invocation.env[2], ("HOME".into(), "/home/vscode".into()));
        assert_eq!(invocation.env[3], ("IS_SANDBOX".into(), "1".into()));

        let homes = invocation.env.iter().filter(|(k, _)| k == "HOME").count();
        let sandboxes = invocation
            .env
            .iter()
            .filter(|(k, _)| k == "IS_SANDBOX")
            .count();
        assert_eq!(homes, 1);
        assert_eq!(sandboxes, 1);
    }

    #[test]
    fn test_aws_env_before_user_overrides() {
        let mut fx = Fixture::new();
        fx.plan.credentials.aws = true;
        fx.plan.aws_env = vec![
            ("AWS_ACCESS_KEY_ID".into(), "A".into()),
            ("AWS_SECRET_ACCESS_KEY".into(), "S".into()),
            ("AWS_REGION".into(), "us-east-1".into()),
        ];
        let user_env = vec!["AWS_REGION=eu-west-1".to_string()];
        let mut planner = fx.planner();
        planner.user_env = &user_env;
        let invocation = planner.plan();

        let positions: Vec<usize> = invocation
            .env
            .iter()
            .enumerate()
            .filter(|(_, (k, _))| k == "AWS_REGION")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(positions.len(), 2);
        // The user override renders later, so it wins in the container.
        assert_eq!(invocation.env[positions[1]].1, "eu-west-1");

        let key_pos = invocation
            .env
            .iter()
            .position(|(k, _)| k == "AWS_ACCESS_KEY_ID")
            .unwrap();
        assert!(key_pos < positions[0]);
    }

    #[test]
    fn test_pass_through_vars_only_when_set() {
        let mut fx = Fixture::new();
        fx.host_env
            .insert("ANTHROPIC_API_KEY".to_string(), "sk-ant".to_string());
        let pass_through = vec![
            "ANTHROPIC_API_KEY".to_string(),
            "OPENAI_API_KEY".to_string(),
        ];
        let mut planner = fx.planner();
        planner.pass_through_vars = &pass_through;
        let invocation = planner.plan();

        assert!(invocation
            .env
            .iter()
            .any(|(k, v)| k == "ANTHROPIC_API_KEY" && v == "sk-ant"));
        assert!(!invocation.env.iter().any(|(k, _)| k == "OPENAI_API_KEY"));
    }

    #[test]
    fn test_credential_mounts_only_when_source_exists() {
        let mut fx = Fixture::new();
        fx.plan.credentials = Credentials::all();
        fs::write(fx.home.path().join(".gitconfig"), "[user]\n").unwrap();
        fs::create_dir_all(fx.home.path().join(".ssh")).unwrap();
        // No gh, gnupg, npmrc or aws sources on this host.

        let invocation = fx.planner().plan();
        let gitconfig = invocation
            .mounts
            .iter()
            .find(|m| m.container_path.ends_with("/.gitconfig"))
            .expect("gitconfig mounted");
        assert!(gitconfig.read_only);

        let ssh = invocation
            .mounts
            .iter()
            .find(|m| m.container_path.ends_with("/.ssh"))
            .expect("ssh mounted");
        assert!(ssh.read_only);

        assert!(!invocation
            .mounts
            .iter()
            .any(|m| m.container_path.ends_with("/.gnupg")
                || m.container_path.ends_with("/.npmrc")
                || m.container_path.ends_with("/.config/gh")
                || m.container_path.ends_with("/.aws")));
    }

    #[test]
    fn test_aws_dir_mounted_read_write() {
        let mut fx = Fixture::new();
        fx.plan.credentials.aws = true;
        fs::create_dir_all(fx.home.path().join(".aws")).unwrap();

        let invocation = fx.planner().plan();
        let aws = invocation
            .mounts
            .iter()
            .find(|m| m.container_path.ends_with("/.aws"))
            .expect("aws mounted");
        assert!(!aws.read_only);
    }

    #[test]
    fn test_gitconfig_symlink_dereferenced() {
        let mut fx = Fixture::new();
        fx.plan.credentials.git = true;
        let real = fx.home.path().join("dotfiles-gitconfig");
        fs::write(&real, "[user]\n").unwrap();
        std::os::unix::fs::symlink(&real, fx.home.path().join(".gitconfig")).unwrap();

        let invocation = fx.planner().plan();
        let gitconfig = invocation
            .mounts
            .iter()
            .find(|m| m.container_path.ends_with("/.gitconfig"))
            .unwrap();
        assert_eq!(gitconfig.host_path, real.canonicalize().unwrap());
    }

    #[test]
    fn test_run_args_shape() {
        let fx = Fixture::new();
        let ports = vec!["8080:80".to_string()];
        let mut planner = fx.planner();
        planner.ports = &ports;
        let invocation = planner.plan();
        let args = invocation.to_run_args(caps());

        assert_eq!(args[0], "run");
        assert_eq!(args[1], "-d");
        assert_eq!(args[2], "-it");
        assert!(args.contains(&"--name".to_string()));
        assert!(args.contains(&"corral-project-main".to_string()));
        assert!(args.contains(&"-p".to_string()));
        assert!(args.contains(&"8080:80".to_string()));
        // Image comes right before the keepalive command.
        let image_pos = args.iter().position(|a| a == "example:latest").unwrap();
        assert_eq!(args[image_pos + 1], "sleep");
        assert_eq!(args[image_pos + 2], "infinity");
    }

    #[test]
    fn test_run_args_without_detached_tty() {
        let fx = Fixture::new();
        let invocation = fx.planner().plan();
        let args = invocation.to_run_args(RuntimeCaps {
            detached_tty: false,
            readonly_mounts: false,
        });
        assert_eq!(args[0], "run");
        assert_eq!(args[1], "-d");
        assert_ne!(args[2], "-it");
    }

    #[test]
    fn test_main_repo_git_dir_mounted_at_same_path() {
        let mut fx = Fixture::new();
        let git_dir = fx.home.path().join("repo/.git");
        fs::create_dir_all(&git_dir).unwrap();
        fx.plan.credentials = Credentials::default();
        let mut planner = fx.planner();
        planner.main_repo_git_dir = Some(&git_dir);
        let invocation = planner.plan();

        let mount = invocation
            .mounts
            .iter()
            .find(|m| m.host_path == git_dir)
            .expect("git dir mounted");
        assert_eq!(mount.container_path, git_dir.display().to_string());
    }
}
