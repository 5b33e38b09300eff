//! `corral refresh-default-container` - force-pull the default image

use anyhow::Result;

use super::definition::RefreshArgs;
use crate::config::Config;
use crate::runtime;
use crate::update;

pub fn run(_args: RefreshArgs) -> Result<()> {
    let config = Config::load_or_default();
    let runtime = runtime::detect(config.runtime_preference())?;
    update::refresh_default_container(&runtime, &config)?;
    Ok(())
}
