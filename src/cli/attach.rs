//! `corral attach` - interactive shell in a running container

use anyhow::{bail, Result};

use super::definition::AttachArgs;
use crate::config::Config;
use crate::container;
use crate::runtime::{self, RuntimeInterface};

pub fn run(args: AttachArgs) -> Result<()> {
    let work_dir = match &args.path {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    let work_dir = work_dir.canonicalize().unwrap_or(work_dir);

    let name = container::container_name(&work_dir, &args.worktree);

    let config = Config::load_or_default();
    let runtime = runtime::detect(config.runtime_preference())?;

    if runtime.find_running(&name)?.is_none() {
        bail!("no running container found for worktree '{}'", args.worktree);
    }

    let id = runtime.container_id(&name)?.unwrap_or(name);
    // Never returns on success: the shell takes over the terminal.
    Err(runtime
        .exec_replace(&id, None, &["/bin/bash".to_string()])
        .into())
}
