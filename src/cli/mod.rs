//! CLI command implementations

pub mod attach;
pub mod configure;
pub mod definition;
pub mod list;
pub mod refresh;
pub mod run;
pub mod stop;

pub use definition::{Cli, Commands};

use anyhow::Result;
use tracing::warn;

use crate::config::Config;
use crate::paths;

/// Load the config, bootstrapping a default file on first run. A broken
/// config degrades to defaults with a warning rather than blocking the
/// invocation.
pub fn load_or_init_config() -> Result<Config> {
    let Some(path) = paths::config_path() else {
        return Ok(Config::default());
    };

    if !path.exists() {
        let config = Config::first_run();
        match config.save_to(&path) {
            Ok(()) => eprintln!(
                "Initialized configuration at {} (edit with 'corral configure')",
                path.display()
            ),
            Err(e) => warn!("could not write initial config: {}", e),
        }
        return Ok(config);
    }

    Ok(Config::load_or_default())
}

/// Shorten a cell for table display. Counts characters, not bytes, so
/// multi-byte input never splits mid-character.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else if max <= 3 {
        s.chars().take(max).collect()
    } else {
        let prefix: String = s.chars().take(max - 3).collect();
        format!("{}...", prefix)
    }
}
