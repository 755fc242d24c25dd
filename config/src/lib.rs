//! Configuration loading for Warden.
//!
//! The config file lives at `~/.warden/config.toml`:
//!
//! ```toml
//! [app]
//! operator_id = "887330488593842177"
//! staff_log_channel_id = "${WARDEN_STAFF_CHANNEL}"
//!
//! [store]
//! path = "isolation_perms.json"
//!
//! [isolation]
//! role_name = "Isolation"
//! channel_name = "isolation"
//! channel_aliases = ["quarantine"]
//! ```
//!
//! `WARDEN_OWNER_ID`, `WARDEN_STORE_PATH` and `WARDEN_STAFF_CHANNEL_ID` take
//! precedence over the file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use warden_types::{ChannelId, InvalidId, UserId, parse_snowflake};

pub const OWNER_ID_ENV: &str = "WARDEN_OWNER_ID";
pub const STORE_PATH_ENV: &str = "WARDEN_STORE_PATH";
pub const STAFF_CHANNEL_ENV: &str = "WARDEN_STAFF_CHANNEL_ID";

const DEFAULT_STORE_FILE: &str = "isolation_perms.json";
const DEFAULT_ROLE_NAME: &str = "Isolation";
const DEFAULT_CHANNEL_NAME: &str = "isolation";
const DEFAULT_CHANNEL_ALIAS: &str = "quarantine";

#[derive(Debug, Default, Deserialize)]
pub struct WardenConfig {
    pub app: Option<AppConfig>,
    pub store: Option<StoreConfig>,
    pub isolation: Option<IsolationSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    /// Global operator allowed to change the isolation configuration.
    pub operator_id: Option<IdValue>,
    /// Channel that receives structured staff notices.
    pub staff_log_channel_id: Option<IdValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreConfig {
    pub path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IsolationSection {
    pub role_name: Option<String>,
    pub channel_name: Option<String>,
    /// Existing channel names `isolation setup` adopts instead of creating one.
    pub channel_aliases: Option<Vec<String>>,
}

/// Snowflakes may be written as TOML integers or strings (strings allow
/// `${VAR}` expansion).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Int(i64),
    Text(String),
}

impl IdValue {
    fn resolve(&self) -> Result<u64, InvalidId> {
        match self {
            Self::Int(value) => u64::try_from(*value).map_err(|_| InvalidId {
                raw: value.to_string(),
            }),
            Self::Text(raw) => parse_snowflake(expand_env_vars(raw).trim()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid {field}: {source}")]
    InvalidId {
        field: &'static str,
        source: InvalidId,
    },
}

/// Fully resolved runtime settings handed to the isolation core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub operator: Option<UserId>,
    pub store_path: PathBuf,
    pub staff_log_channel: Option<ChannelId>,
    pub role_name: String,
    pub channel_name: String,
    pub channel_aliases: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            operator: None,
            store_path: default_store_path(),
            staff_log_channel: None,
            role_name: DEFAULT_ROLE_NAME.to_string(),
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            channel_aliases: vec![DEFAULT_CHANNEL_ALIAS.to_string()],
        }
    }
}

impl Settings {
    /// Load the config file (if any) and apply process environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config = WardenConfig::load()?;
        Self::resolve(config.as_ref(), |key| env::var(key).ok())
    }

    /// Merge defaults, the parsed file and environment lookups, in that order.
    pub fn resolve(
        config: Option<&WardenConfig>,
        lookup_env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(app) = config.and_then(|c| c.app.as_ref()) {
            if let Some(raw) = &app.operator_id {
                settings.operator = Some(UserId::new(resolve_id("app.operator_id", raw)?));
            }
            if let Some(raw) = &app.staff_log_channel_id {
                settings.staff_log_channel = Some(ChannelId::new(resolve_id(
                    "app.staff_log_channel_id",
                    raw,
                )?));
            }
        }
        if let Some(path) = config
            .and_then(|c| c.store.as_ref())
            .and_then(|s| s.path.as_deref())
        {
            settings.store_path = PathBuf::from(expand_env_vars(path));
        }
        if let Some(isolation) = config.and_then(|c| c.isolation.as_ref()) {
            if let Some(name) = non_blank(isolation.role_name.as_deref()) {
                settings.role_name = name;
            }
            if let Some(name) = non_blank(isolation.channel_name.as_deref()) {
                settings.channel_name = name;
            }
            if let Some(aliases) = &isolation.channel_aliases {
                settings.channel_aliases = aliases
                    .iter()
                    .filter_map(|a| non_blank(Some(a)))
                    .collect();
            }
        }

        if let Some(raw) = lookup_env(OWNER_ID_ENV) {
            let id = parse_snowflake(raw.trim()).map_err(|source| ConfigError::InvalidId {
                field: OWNER_ID_ENV,
                source,
            })?;
            settings.operator = Some(UserId::new(id));
        }
        if let Some(raw) = lookup_env(STAFF_CHANNEL_ENV) {
            let id = parse_snowflake(raw.trim()).map_err(|source| ConfigError::InvalidId {
                field: STAFF_CHANNEL_ENV,
                source,
            })?;
            settings.staff_log_channel = Some(ChannelId::new(id));
        }
        if let Some(path) = lookup_env(STORE_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            settings.store_path = PathBuf::from(path);
        }

        Ok(settings)
    }
}

fn resolve_id(field: &'static str, raw: &IdValue) -> Result<u64, ConfigError> {
    raw.resolve()
        .map_err(|source| ConfigError::InvalidId { field, source })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

impl WardenConfig {
    /// Read the config file at the default location. `Ok(None)` when absent.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }
}

/// Expand `${VAR}` references. Unset variables expand to the empty string;
/// unterminated or empty references are kept verbatim.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                out.push_str(&env::var(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".warden"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

fn default_store_path() -> PathBuf {
    config_dir().map_or_else(
        || PathBuf::from(DEFAULT_STORE_FILE),
        |dir| dir.join(DEFAULT_STORE_FILE),
    )
}
