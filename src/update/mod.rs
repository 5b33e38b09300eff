//! Default container image update checks
//!
//! Checks go through the container runtime, never a registry API. Stale
//! `latest` tags produce at most one notification per digest, tracked in
//! `version-tracking.json`.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::config::version_tracking::VersionTracking;
use crate::config::Config;
use crate::paths;
use crate::runtime::{ContainerRuntime, RuntimeInterface};

/// `latest`-tagged images older than this are update candidates.
const STALE_AFTER_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    Pull,
    UseExisting,
}

#[derive(Debug, Clone)]
pub struct UpdateDecision {
    pub action: UpdateAction,
    pub reason: &'static str,
}

/// Time since the local image was created, per `inspect {{.Created}}`.
pub fn image_age(runtime: &ContainerRuntime, image: &str) -> Option<Duration> {
    let args: Vec<String> = ["image", "inspect", "--format", "{{.Created}}", image]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let output = runtime.run(&args).ok()?;
    let created = DateTime::parse_from_rfc3339(output.trim()).ok()?;
    Some(Utc::now().signed_duration_since(created.with_timezone(&Utc)))
}

/// The first repo digest of the local image, if any.
pub fn local_digest(runtime: &ContainerRuntime, image: &str) -> Option<String> {
    let args: Vec<String> = [
        "image",
        "inspect",
        "--format",
        "{{index .RepoDigests 0}}",
        image,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let output = runtime.run(&args).ok()?;
    let digest = output.trim().to_string();
    if digest.is_empty() {
        None
    } else {
        Some(digest)
    }
}

/// Only `latest`-style tags auto-refresh; pinned tags are assumed
/// intentional.
pub fn should_update_image(image: &str, age: Duration, force: bool) -> bool {
    if force {
        return true;
    }
    let is_latest = image.ends_with(":latest") || !image.contains(':');
    is_latest && age > Duration::hours(STALE_AFTER_HOURS)
}

pub fn image_update_action(
    runtime: &ContainerRuntime,
    image: &str,
    force: bool,
) -> UpdateDecision {
    if !runtime.image_exists(image) {
        return UpdateDecision {
            action: UpdateAction::Pull,
            reason: "image not found locally",
        };
    }
    let stale = image_age(runtime, image)
        .map(|age| should_update_image(image, age, force))
        .unwrap_or(force);
    if stale {
        UpdateDecision {
            action: UpdateAction::Pull,
            reason: "new version may be available",
        }
    } else {
        UpdateDecision {
            action: UpdateAction::UseExisting,
            reason: "image is fresh",
        }
    }
}

/// First eight hex characters of a digest, without the algorithm prefix.
pub fn short_digest(digest: &str) -> &str {
    let digest = digest
        .rsplit_once("sha256:")
        .map(|(_, d)| d)
        .unwrap_or(digest);
    if digest.len() >= 8 {
        &digest[..8]
    } else {
        digest
    }
}

/// Decide whether to notify about a digest change, suppressing repeats
/// inside the check frequency window.
pub fn should_notify(
    current_digest: &str,
    remote_digest: &str,
    last_notified: Option<DateTime<Utc>>,
    frequency: Duration,
) -> bool {
    if current_digest == remote_digest {
        return false;
    }
    if let Some(at) = last_notified {
        if Utc::now().signed_duration_since(at) < frequency {
            return false;
        }
    }
    true
}

/// Periodic best-effort check run before an invocation. Warnings only; the
/// invocation proceeds regardless.
pub fn check_default_image(runtime: &ContainerRuntime, config: &Config) {
    let settings = &config.default_container;
    if !settings.check_for_updates {
        return;
    }
    let Some(tracking_path) = paths::version_tracking_path() else {
        return;
    };

    let mut tracking = VersionTracking::load_or_default(&tracking_path);
    let frequency = Duration::hours(settings.check_frequency_hours as i64);
    if let Some(last) = tracking.last_check {
        if Utc::now().signed_duration_since(last) < frequency {
            return;
        }
    }
    tracking.last_check = Some(Utc::now());

    let image = config.effective_default_image();
    if runtime.image_exists(&image) {
        let decision = image_update_action(runtime, &image, false);
        debug!("update check for {}: {}", image, decision.reason);
        if decision.action == UpdateAction::Pull {
            if settings.auto_pull_updates {
                let before = local_digest(runtime, &image);
                match runtime.pull(&image) {
                    Ok(()) => {
                        let after = local_digest(runtime, &image);
                        if before != after {
                            if let Some(digest) = &after {
                                eprintln!(
                                    "Updated default container image to {} ({})",
                                    image,
                                    short_digest(digest)
                                );
                            }
                        }
                    }
                    Err(e) => warn!("auto-pull of {} failed: {}", image, e),
                }
            } else {
                let digest = local_digest(runtime, &image).unwrap_or_default();
                if !tracking.has_notified(&image, &digest) {
                    eprintln!(
                        "A newer default container image may be available.\n\
                         Run 'corral refresh-default-container' to update."
                    );
                    tracking.mark_notified(&image, &digest);
                }
            }
        }
    }

    if let Err(e) = tracking.save_to(&tracking_path) {
        warn!("failed to save version tracking: {}", e);
    }
}

/// Force-pull the default container image.
pub fn refresh_default_container(
    runtime: &ContainerRuntime,
    config: &Config,
) -> crate::runtime::Result<()> {
    let image = config.effective_default_image();
    let before = local_digest(runtime, &image);

    eprintln!("Pulling {}...", image);
    runtime.pull(&image)?;

    match (before, local_digest(runtime, &image)) {
        (Some(old), Some(new)) if old != new => {
            println!(
                "Updated {} ({} -> {})",
                image,
                short_digest(&old),
                short_digest(&new)
            );
        }
        (None, Some(new)) => {
            println!("Pulled {} ({})", image, short_digest(&new));
        }
        _ => {
            println!("{} is already up to date", image);
        }
    }
    Ok(())
}
