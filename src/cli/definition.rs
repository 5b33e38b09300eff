//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "corral",
    version,
    about = "Launch commands in isolated containers",
    long_about = "Corral runs commands (like AI coding agents) inside isolated containers\n\
                  with automated worktree and dev container management."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a command in a container bound to this project's worktree
    Run(RunArgs),

    /// List running corral-managed containers
    List(ListArgs),

    /// Stop and remove containers
    Stop(StopArgs),

    /// Attach an interactive shell to a running container
    Attach(AttachArgs),

    /// Force-pull the latest default container image
    #[command(name = "refresh-default-container")]
    RefreshDefaultContainer(RefreshArgs),

    /// Show or edit the configuration
    Configure(ConfigureArgs),

    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Project path (default: current directory)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Worktree name (created if needed; default: current branch)
    #[arg(long)]
    pub worktree: Option<String>,

    /// Skip worktree handling and mount the directory directly
    #[arg(long, conflicts_with = "worktree")]
    pub no_worktree: bool,

    /// Additional env vars (KEY=value, or KEY to pass through from the host)
    #[arg(long = "env", short = 'e', value_name = "KEY[=VALUE]")]
    pub env: Vec<String>,

    /// Inject a named environment config from the config file
    #[arg(long, value_name = "NAME")]
    pub env_config: Option<String>,

    /// Publish container ports ([ip:]host:container[/proto])
    #[arg(long = "publish", short = 'p', value_name = "SPEC")]
    pub publish: Vec<String>,

    /// Reconnect to an existing running container for this worktree
    #[arg(long)]
    pub reconnect: bool,

    /// Mount ~/.gitconfig (read-only)
    #[arg(long)]
    pub git: bool,

    /// Mount ~/.ssh (read-only)
    #[arg(long)]
    pub ssh: bool,

    /// Mount GitHub CLI credentials (read-only)
    #[arg(long)]
    pub gh: bool,

    /// Mount ~/.gnupg (read-only)
    #[arg(long)]
    pub gpg: bool,

    /// Mount ~/.npmrc (read-only)
    #[arg(long)]
    pub npm: bool,

    /// Mount ~/.aws and resolve AWS credentials
    #[arg(long)]
    pub aws: bool,

    /// Enable every credential category
    #[arg(long)]
    pub all_credentials: bool,

    /// Show the underlying container and git commands
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Command to run inside the container
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Also show host paths and launch commands
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Args, Debug, Default)]
pub struct StopArgs {
    /// Container name to stop
    #[arg(conflicts_with_all = ["worktree", "all"])]
    pub container: Option<String>,

    /// Project path (default: current directory)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Stop the container for this worktree
    #[arg(long)]
    pub worktree: Option<String>,

    /// Stop all corral-managed containers
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug, Default)]
pub struct AttachArgs {
    /// Project path (default: current directory)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Worktree whose container to attach to
    #[arg(long)]
    pub worktree: String,
}

#[derive(Args, Debug, Default)]
pub struct RefreshArgs {
    /// Show detailed output
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Args, Debug, Default)]
pub struct ConfigureArgs {
    /// Print the effective configuration and exit
    #[arg(long)]
    pub show: bool,

    /// Set the container runtime (docker, podman, apple-container)
    #[arg(long, value_name = "RUNTIME")]
    pub runtime: Option<String>,

    /// Toggle a credential category, e.g. --set-credential git=true
    #[arg(long = "set-credential", value_name = "CATEGORY=BOOL")]
    pub set_credential: Vec<String>,

    /// Set the default container image
    #[arg(long, value_name = "IMAGE")]
    pub default_image: Option<String>,

    /// Enable or disable periodic update checks
    #[arg(long, value_name = "BOOL")]
    pub check_for_updates: Option<bool>,

    /// Automatically pull new default image versions
    #[arg(long, value_name = "BOOL")]
    pub auto_pull_updates: Option<bool>,

    /// Hours between update checks
    #[arg(long, value_name = "HOURS")]
    pub check_frequency_hours: Option<u64>,

    /// Add a pass-through environment variable
    #[arg(long, value_name = "NAME")]
    pub add_env_var: Vec<String>,

    /// Remove a pass-through environment variable
    #[arg(long, value_name = "NAME")]
    pub remove_env_var: Vec<String>,
}
