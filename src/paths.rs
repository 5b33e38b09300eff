//! XDG base directory resolution
//!
//! Config lives under `$XDG_CONFIG_HOME/corral`, durable data (worktrees,
//! shared credential files) under `$XDG_DATA_HOME/corral`.

use std::path::PathBuf;

pub const APP_NAME: &str = "corral";

pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

fn xdg_dir(var: &str, fallback: &[&str]) -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(var) {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir).join(APP_NAME));
        }
    }
    let mut path = home_dir()?;
    for part in fallback {
        path.push(part);
    }
    path.push(APP_NAME);
    Some(path)
}

pub fn config_dir() -> Option<PathBuf> {
    xdg_dir("XDG_CONFIG_HOME", &[".config"])
}

pub fn data_dir() -> Option<PathBuf> {
    xdg_dir("XDG_DATA_HOME", &[".local", "share"])
}

pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.json"))
}

pub fn version_tracking_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("version-tracking.json"))
}

/// Directory that holds all worktrees for a project, keyed by project basename.
pub fn worktrees_dir(project_name: &str) -> Option<PathBuf> {
    data_dir().map(|d| d.join("worktrees").join(project_name))
}

pub fn credentials_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("credentials"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_path_honors_xdg_override() {
        std::env::set_var("XDG_CONFIG_HOME", "/tmp/xdg-test");
        let path = config_path().unwrap();
        assert_eq!(path, PathBuf::from("/tmp/xdg-test/corral/config.json"));
        std::env::remove_var("XDG_CONFIG_HOME");
    }

    #[test]
    #[serial]
    fn test_data_dir_falls_back_to_local_share() {
        std::env::remove_var("XDG_DATA_HOME");
        let dir = data_dir().unwrap();
        assert!(dir.ends_with(".local/share/corral"));
    }

    #[test]
    #[serial]
    fn test_worktrees_dir_includes_project_name() {
        std::env::set_var("XDG_DATA_HOME", "/tmp/xdg-data-test");
        let dir = worktrees_dir("myproject").unwrap();
        assert_eq!(
            dir,
            PathBuf::from("/tmp/xdg-data-test/corral/worktrees/myproject")
        );
        std::env::remove_var("XDG_DATA_HOME");
    }
}
