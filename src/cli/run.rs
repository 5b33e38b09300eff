//! `corral run` - the main entry point into the sandbox

use anyhow::Result;

use super::definition::RunArgs;
use super::load_or_init_config;
use crate::config::Credentials;
use crate::container;
use crate::runner::{self, RunRequest};
use crate::runtime;
use crate::update;

pub fn run(args: RunArgs) -> Result<()> {
    let config = load_or_init_config()?;

    let mut credentials = config.default_credentials;
    if args.all_credentials {
        credentials = Credentials::all();
    }
    credentials = credentials.union(Credentials {
        git: args.git,
        ssh: args.ssh,
        gh: args.gh,
        gpg: args.gpg,
        npm: args.npm,
        aws: args.aws,
    });

    // Periodic default-image check; failures never block the run.
    if let Ok(runtime) = runtime::detect(config.runtime_preference()) {
        update::check_default_image(&runtime, &config);
    }

    let launch_command = container::shell_join(&std::env::args().collect::<Vec<_>>());

    let request = RunRequest {
        path: args.path,
        worktree: args.worktree,
        no_worktree: args.no_worktree,
        env: args.env,
        env_config: args.env_config,
        credentials,
        publish_ports: args.publish,
        reconnect: args.reconnect,
        verbose: args.verbose,
        launch_command,
        command: args.command,
    };

    runner::run(&config, request)?;
    Ok(())
}
