//! Environment-driven configuration.

use crate::event::parse_bool_str;
use crate::secrets::{get_secret, local_unifi_key_path, read_trimmed};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_CAMERA_NAME: &str = "G4 Pro";
const DEFAULT_TRIGGER_URL: &str = "http://192.168.1.55:7777/trigger/demo_move_home?x=600&y=400&z=0";
const DEFAULT_TRIGGER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_COOLDOWN_SECS: u64 = 1200;
const DEFAULT_PROTECT_HOST: &str = "192.168.1.59";
const DEFAULT_STATUS_URL: &str = "http://192.168.1.55:7777/health";
const DEFAULT_RESTART_RETRIES: i64 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: expected a boolean, got {value:?}")]
    InvalidBool { var: String, value: String },

    #[error("{var}: expected a non-negative integer, got {value:?}")]
    InvalidNumber { var: String, value: String },

    #[error("{var}: unsupported HTTP method {value:?} (use GET or POST)")]
    InvalidMethod { var: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMethod {
    Get,
    Post,
}

impl FromStr for TriggerMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(TriggerMethod::Get),
            "POST" => Ok(TriggerMethod::Post),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub url: String,
    pub method: TriggerMethod,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MotionConfig {
    pub camera_name: String,
    pub require_camera_match: bool,
    pub require_motion: bool,
    pub cooldown: Duration,
    pub trigger: TriggerConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AccessConfig {
    pub expected_host: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    /// Destination for relayed UniFi alarms.
    pub discord_unifi_webhook: Option<String>,
    /// General-purpose Discord channel (restart and trigger notices).
    pub discord_webhook: Option<String>,
    pub teams_webhook: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub enabled: bool,
    pub retries: u32,
    pub status_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub motion: MotionConfig,
    pub access: AccessConfig,
    pub notify: NotifyConfig,
    pub startup: StartupConfig,
}

impl Config {
    /// Load from the process environment, resolving the local key fallback
    /// relative to the working directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|k: &str| std::env::var(k).ok(), Path::new("."))
    }

    pub fn from_lookup<F>(lookup: &F, base_dir: &Path) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let method_raw = var("UNIFI_MOTION_TRIGGER_METHOD").unwrap_or_else(|| "GET".into());
        let method: TriggerMethod = method_raw
            .parse()
            .map_err(|_| ConfigError::InvalidMethod {
                var: "UNIFI_MOTION_TRIGGER_METHOD".into(),
                value: method_raw.clone(),
            })?;

        let motion = MotionConfig {
            camera_name: var("UNIFI_MOTION_CAMERA_NAME")
                .unwrap_or_else(|| DEFAULT_CAMERA_NAME.into()),
            require_camera_match: bool_var(lookup, "UNIFI_MOTION_REQUIRE_CAMERA", true)?,
            require_motion: bool_var(lookup, "UNIFI_MOTION_REQUIRE_MOTION", true)?,
            cooldown: Duration::from_secs(number_var(
                lookup,
                "UNIFI_MOTION_COOLDOWN_SECONDS",
                DEFAULT_COOLDOWN_SECS,
            )?),
            trigger: TriggerConfig {
                url: var("UNIFI_MOTION_TRIGGER_URL").unwrap_or_else(|| DEFAULT_TRIGGER_URL.into()),
                method,
                timeout: Duration::from_secs(number_var(
                    lookup,
                    "UNIFI_MOTION_TRIGGER_TIMEOUT",
                    DEFAULT_TRIGGER_TIMEOUT_SECS,
                )?),
            },
        };

        // An explicitly blank host disables the origin check.
        let expected_host = match lookup("UNIFI_PROTECT_HOST") {
            Some(h) => Some(h.trim().to_string()).filter(|h| !h.is_empty()),
            None => Some(DEFAULT_PROTECT_HOST.into()),
        };

        let access = AccessConfig {
            expected_host,
            api_key: get_secret(lookup, "UNIFI_PROTECT_API_KEY")
                .or_else(|| read_trimmed(&local_unifi_key_path(base_dir))),
        };

        let notify = NotifyConfig {
            discord_unifi_webhook: get_secret(lookup, "DISCORD_UNIFI_WEBHOOK_URL"),
            discord_webhook: get_secret(lookup, "DISCORD_WEBHOOK_URL"),
            teams_webhook: var("TEAMS_WEBHOOK_URL").map(|v| v.trim().to_string()),
        };

        // Zero and negative counts still make one attempt.
        let retries = var("DISCORD_RESTART_RETRIES")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_RESTART_RETRIES)
            .clamp(1, u32::MAX as i64) as u32;

        // Unset means enabled; anything but a truthy word (blank included)
        // turns the notice off.
        let startup = StartupConfig {
            enabled: lookup("DISCORD_RESTART_NOTIFY")
                .map(|v| {
                    matches!(
                        v.trim().to_ascii_lowercase().as_str(),
                        "1" | "true" | "yes" | "on"
                    )
                })
                .unwrap_or(true),
            retries,
            status_url: var("STATUS_URL").unwrap_or_else(|| DEFAULT_STATUS_URL.into()),
        };

        let port = number_var(lookup, "PORT", DEFAULT_PORT as u64)?;
        let port = u16::try_from(port).map_err(|_| ConfigError::InvalidNumber {
            var: "PORT".into(),
            value: port.to_string(),
        })?;

        Ok(Config {
            port,
            motion,
            access,
            notify,
            startup,
        })
    }
}

fn bool_var<F>(lookup: &F, name: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => parse_bool_str(&raw).ok_or(ConfigError::InvalidBool {
            var: name.into(),
            value: raw,
        }),
    }
}

fn number_var<F>(lookup: &F, name: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            var: name.into(),
            value: raw,
        }),
    }
}
