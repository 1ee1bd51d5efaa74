//! Hub profiles for hmccu.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `hmccu_core::HubConfig`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hmccu_core::{HubConfig, HubCredentials, TlsVerification};

const KEYRING_SERVICE: &str = "hmccu";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {what} configured for profile '{profile}'")]
    NoCredentials { profile: String, what: &'static str },

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named hub profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `None`.
    pub fn profile<'a>(
        &'a self,
        name: Option<&'a str>,
    ) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile(name.into()))
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Accept self-signed hub certificates.
    #[serde(default = "default_insecure")]
    pub insecure: bool,

    /// Outbound call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_interface_id")]
    pub interface_id: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: default_insecure(),
            timeout: default_timeout(),
            interface_id: default_interface_id(),
        }
    }
}

fn default_insecure() -> bool {
    true
}
fn default_timeout() -> u64 {
    10
}
fn default_interface_id() -> String {
    hmccu_core::config::DEFAULT_INTERFACE_ID.into()
}

/// A named hub profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Hub hostname or IP address.
    pub host: String,

    /// XML-RPC port of the hub interface (2001 for BidCos-RF).
    pub request_port: Option<u16>,

    /// Local port the hub pushes events to; 0 for ephemeral.
    pub callback_port: Option<u16>,

    /// Host advertised in the callback URL (discovered when unset).
    pub callback_host: Option<String>,

    /// Local address the callback listener binds to.
    pub callback_bind: Option<IpAddr>,

    /// Override the registered interface id.
    pub interface_id: Option<String>,

    /// Port of the XML-API add-on.
    pub xml_api_port: Option<u16>,

    /// XML-API session token (plaintext; prefer keyring or env var).
    pub xml_api_token: Option<String>,

    /// Environment variable name containing the XML-API token.
    pub xml_api_token_env: Option<String>,

    /// Username for hubs with RPC authentication.
    pub username: Option<String>,

    /// Password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Use https for XML-RPC calls.
    pub tls: Option<bool>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Consecutive malformed hub calls before an alarm is logged.
    pub violation_threshold: Option<u32>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "hmccu", "hmccu").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hmccu");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` (missing file = defaults), then `HMCCU_*` env vars.
///
/// Nested keys use a double underscore: `HMCCU_PROFILES__HOME__HOST`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HMCCU_").split("__"));

    Ok(figment.extract()?)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Env var named by the profile, then the system keyring, then plaintext.
fn resolve_secret(
    env_name: Option<&str>,
    keyring_key: &str,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    if let Some(val) = env_name.and_then(|name| std::env::var(name).ok()) {
        return Some(SecretString::from(val));
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, keyring_key) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    plaintext.map(|p| SecretString::from(p.to_owned()))
}

/// Resolve RPC credentials. `Ok(None)` when the profile has no username.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<HubCredentials>, ConfigError> {
    let Some(username) = profile.username.clone() else {
        return Ok(None);
    };

    let password = resolve_secret(
        profile.password_env.as_deref(),
        &format!("{profile_name}/password"),
        profile.password.as_deref(),
    )
    .ok_or_else(|| ConfigError::NoCredentials {
        profile: profile_name.into(),
        what: "password",
    })?;

    Ok(Some(HubCredentials { username, password }))
}

/// Resolve the XML-API token, if any source provides one.
pub fn resolve_xml_api_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_secret(
        profile.xml_api_token_env.as_deref(),
        &format!("{profile_name}/xml-api-token"),
        profile.xml_api_token.as_deref(),
    )
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `HubConfig` from a profile, falling back to `defaults`.
pub fn profile_to_hub_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<HubConfig, ConfigError> {
    if profile.host.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: format!("profile '{profile_name}' has no hub host"),
        });
    }

    let mut config = HubConfig::new(profile.host.trim());

    if let Some(port) = profile.request_port {
        config.address.request_port = port;
    }
    if let Some(port) = profile.callback_port {
        config.address.callback_port = port;
    }
    if let Some(bind) = profile.callback_bind {
        config.callback_bind = bind;
    }
    if let Some(port) = profile.xml_api_port {
        config.xml_api_port = port;
    }

    config.callback_host.clone_from(&profile.callback_host);
    config.interface_id = profile
        .interface_id
        .clone()
        .unwrap_or_else(|| defaults.interface_id.clone());
    if config.interface_id.is_empty() {
        return Err(ConfigError::Validation {
            field: "interface_id".into(),
            reason: "an empty interface id would de-register the driver".into(),
        });
    }

    config.credentials = resolve_credentials(profile, profile_name)?;
    config.xml_api_token = resolve_xml_api_token(profile, profile_name);

    config.use_tls = profile.tls.unwrap_or(false);
    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    if let Some(threshold) = profile.violation_threshold {
        config.violation_alarm_threshold = threshold;
    }

    Ok(config)
}
