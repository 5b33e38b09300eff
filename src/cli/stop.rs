//! `corral stop` - stop and remove managed containers

use anyhow::{bail, Result};

use super::definition::StopArgs;
use crate::config::Config;
use crate::container;
use crate::runner;
use crate::runtime::{self, RuntimeInterface};

pub fn run(args: StopArgs) -> Result<()> {
    let config = Config::load_or_default();
    let runtime = runtime::detect(config.runtime_preference())?;

    if args.all {
        let containers = runtime.list_managed()?;
        if containers.is_empty() {
            println!("No corral-managed containers running");
            return Ok(());
        }
        let mut stopped = 0;
        for c in &containers {
            match runner::stop_container(&runtime, &c.name) {
                Ok(()) => stopped += 1,
                Err(e) => eprintln!("Warning: {}", e),
            }
        }
        println!("\nStopped {} container(s)", stopped);
        return Ok(());
    }

    if let Some(name) = &args.container {
        runner::stop_container(&runtime, name)?;
        return Ok(());
    }

    let Some(worktree) = &args.worktree else {
        bail!("specify a container name, --worktree, or --all");
    };

    let work_dir = match &args.path {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    let work_dir = work_dir.canonicalize().unwrap_or(work_dir);

    let name = container::container_name(&work_dir, worktree);
    runner::stop_container(&runtime, &name)?;
    Ok(())
}
