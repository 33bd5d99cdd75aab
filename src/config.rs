//! Settings resolution.
//!
//! Each setting comes from the first source that has it: command-line
//! flag, environment variable, config file, built-in default.
use crate::cli::GlobalArgs;
use crate::poll::{PollPolicy, DEFAULT_POLL_INTERVAL};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_AWS_COMMAND: &str = "aws";

pub const ENV_CONFIG: &str = "AMI_AUTOMATION_CONFIG";
pub const ENV_AWS_COMMAND: &str = "AMI_AUTOMATION_AWS_COMMAND";
pub const ENV_POLL_INTERVAL: &str = "AMI_AUTOMATION_POLL_INTERVAL_SECS";
pub const ENV_TIMEOUT: &str = "AMI_AUTOMATION_TIMEOUT_SECS";
const ENV_REGIONS: [&str; 2] = ["AWS_REGION", "AWS_DEFAULT_REGION"];

/// Optional settings stored in `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub aws_command: String,
    /// Home region; `None` defers to the AWS CLI's own configuration.
    pub region: Option<String>,
    pub poll: PollPolicy,
}

/// Default config location under the user's config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ami-automation").join("config.json"))
}

pub fn load_config(path: &Path) -> Result<FileConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: FileConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    Ok(config)
}

/// Load the config named by flag or env, else the default file if present.
///
/// A file named explicitly must exist; the default file is optional.
pub fn load_for_run(
    explicit: Option<&Path>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    if let Some(path) = env(ENV_CONFIG) {
        return load_config(Path::new(&path));
    }
    match default_config_path() {
        Some(path) if path.is_file() => load_config(&path),
        _ => Ok(FileConfig::default()),
    }
}

pub fn resolve_settings(
    global: &GlobalArgs,
    env: &dyn Fn(&str) -> Option<String>,
    file: &FileConfig,
) -> Result<Settings> {
    let aws_command = global
        .aws_command
        .clone()
        .or_else(|| non_empty(env(ENV_AWS_COMMAND)))
        .or_else(|| file.aws_command.clone())
        .unwrap_or_else(|| DEFAULT_AWS_COMMAND.to_string());

    let region = global
        .source_region
        .clone()
        .or_else(|| ENV_REGIONS.iter().find_map(|key| non_empty(env(key))))
        .or_else(|| file.region.clone());

    let interval_secs = match global.poll_interval {
        Some(secs) => Some(secs),
        None => env_secs(env, ENV_POLL_INTERVAL)?,
    }
    .or(file.poll_interval_secs);
    let timeout_secs = match global.timeout {
        Some(secs) => Some(secs),
        None => env_secs(env, ENV_TIMEOUT)?,
    }
    .or(file.timeout_secs);

    let settings = Settings {
        aws_command,
        region,
        poll: PollPolicy {
            interval: interval_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            timeout: timeout_secs.map(Duration::from_secs),
        },
    };
    validate_settings(&settings)?;
    Ok(settings)
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.aws_command.trim().is_empty() {
        return Err(anyhow!("aws_command must be non-empty"));
    }
    if settings.poll.interval < Duration::from_secs(1) {
        return Err(anyhow!("poll interval must be at least 1 second"));
    }
    if settings.poll.timeout == Some(Duration::ZERO) {
        return Err(anyhow!("timeout must be greater than 0 seconds"));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn env_secs(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    match non_empty(env(key)) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} must be a whole number of seconds (got {raw:?})")),
        None => Ok(None),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
