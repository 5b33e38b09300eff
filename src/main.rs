//! Corral - launch AI coding agents in isolated containers

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use corral::cli::{self, Cli, Commands};

fn main() -> Result<()> {
    if std::env::var("CORRAL_DEBUG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter("corral=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Completion { shell } => {
            generate(shell, &mut Cli::command(), "corral", &mut std::io::stdout());
            Ok(())
        }
        Commands::Run(args) => cli::run::run(args),
        Commands::List(args) => cli::list::run(args),
        Commands::Stop(args) => cli::stop::run(args),
        Commands::Attach(args) => cli::attach::run(args),
        Commands::RefreshDefaultContainer(args) => cli::refresh::run(args),
        Commands::Configure(args) => cli::configure::run(args),
    }
}
