//! `corral configure` - edit the configuration
//!
//! Editing is a pure function from the current config and the requested
//! edits to a partial update; the write path preserves unknown fields.

use anyhow::{bail, Context, Result};

use super::definition::ConfigureArgs;
use crate::config::{
    update_config_file, Config, ConfigUpdates, Credentials, RuntimeKind,
};
use crate::paths;

pub fn run(args: ConfigureArgs) -> Result<()> {
    let path = paths::config_path().context("could not determine config directory")?;
    let config = if path.exists() {
        Config::load_from(&path)?
    } else {
        Config::first_run()
    };

    let updates = build_updates(&config, &args)?;

    if updates.is_empty() {
        println!(
            "{}",
            serde_json::to_string_pretty(&config).context("failed to render config")?
        );
        if !args.show {
            eprintln!("\nConfig file: {}", path.display());
            eprintln!("Edit with flags, e.g. 'corral configure --set-credential aws=true'");
        }
        return Ok(());
    }

    update_config_file(&path, &updates)?;
    println!("Configuration saved to {}", path.display());
    Ok(())
}

/// Translate flag edits into a partial update against the current config.
fn build_updates(config: &Config, args: &ConfigureArgs) -> Result<ConfigUpdates> {
    let mut updates = ConfigUpdates::default();

    if let Some(runtime) = &args.runtime {
        let Some(kind) = RuntimeKind::parse(runtime) else {
            bail!(
                "unknown runtime '{}' (expected docker, podman or apple-container)",
                runtime
            );
        };
        updates.container_runtime = Some(kind.to_string());
    }

    if !args.set_credential.is_empty() {
        updates.default_credentials = Some(apply_credential_edits(
            config.default_credentials,
            &args.set_credential,
        )?);
    }

    if args.default_image.is_some()
        || args.check_for_updates.is_some()
        || args.auto_pull_updates.is_some()
        || args.check_frequency_hours.is_some()
    {
        let mut container = config.default_container.clone();
        if let Some(image) = &args.default_image {
            container.image = image.clone();
        }
        if let Some(check) = args.check_for_updates {
            container.check_for_updates = check;
        }
        if let Some(auto) = args.auto_pull_updates {
            container.auto_pull_updates = auto;
        }
        if let Some(hours) = args.check_frequency_hours {
            container.check_frequency_hours = hours;
        }
        updates.default_container = Some(container);
    }

    if !args.add_env_var.is_empty() || !args.remove_env_var.is_empty() {
        let mut vars = config.pass_through_vars();
        for var in &args.add_env_var {
            if !vars.contains(var) {
                vars.push(var.clone());
            }
        }
        vars.retain(|v| !args.remove_env_var.contains(v));
        updates.default_env_vars = Some(vars);
    }

    Ok(updates)
}

/// Apply `category=bool` edits to a credential toggle set.
fn apply_credential_edits(base: Credentials, edits: &[String]) -> Result<Credentials> {
    let mut creds = base;
    for edit in edits {
        let Some((category, value)) = edit.split_once('=') else {
            bail!("invalid credential edit '{}' (expected CATEGORY=BOOL)", edit);
        };
        let enabled: bool = value
            .parse()
            .with_context(|| format!("invalid boolean in '{}'", edit))?;
        match category {
            "git" => creds.git = enabled,
            "ssh" => creds.ssh = enabled,
            "gh" => creds.gh = enabled,
            "gpg" => creds.gpg = enabled,
            "npm" => creds.npm = enabled,
            "aws" => creds.aws = enabled,
            "all" => {
                creds = if enabled {
                    Credentials::all()
                } else {
                    Credentials::default()
                }
            }
            other => bail!(
                "unknown credential category '{}' (expected git, ssh, gh, gpg, npm, aws or all)",
                other
            ),
        }
    }
    Ok(creds)
}
