use crate::domain::constants::{
    DEFAULT_HOST, DEFAULT_MAX_WORKERS, DEFAULT_OPA_BINARY, DEFAULT_TIMEOUT_SECS, ENV_API_TOKEN,
    ENV_CONFIG_FILE, ENV_HOST, ENV_MAX_WORKERS, ENV_OPA_BINARY, ENV_ORG, MAX_WORKERS_CAP,
};
use crate::domain::models::ConfigFile;
use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Values given on the command line. They win over everything else.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub org: Option<String>,
    pub api_token: Option<String>,
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub host: String,
    pub org: String,
    pub api_token: String,
    pub max_workers: usize,
    pub timeout: Duration,
    pub opa_binary: PathBuf,
    pub opa_v0_compatible: bool,
}

impl Settings {
    pub fn load(overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    /// Layers defaults, the config file, the environment (read through
    /// `env`) and `overrides`, lowest first. Empty values count as unset.
    pub fn resolve(
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let file = read_config_file(overrides, &lookup)?;

        let host = pick(&overrides.host, lookup(ENV_HOST), file.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let org = pick(&overrides.org, lookup(ENV_ORG), file.org).ok_or(ConfigError::Missing {
            setting: "org",
            flag: "org",
            env: ENV_ORG,
        })?;
        let api_token = pick(&overrides.api_token, lookup(ENV_API_TOKEN), file.api_token)
            .ok_or(ConfigError::Missing {
                setting: "api token",
                flag: "api-token",
                env: ENV_API_TOKEN,
            })?;

        let max_workers = match lookup(ENV_MAX_WORKERS) {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| ConfigError::Invalid {
                setting: "max_workers",
                value: raw.clone(),
            })?,
            None => file.max_workers.unwrap_or(DEFAULT_MAX_WORKERS),
        }
        .clamp(1, MAX_WORKERS_CAP);

        let timeout_secs = file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                setting: "timeout_secs",
                value: "0".to_string(),
            });
        }

        let opa_binary = lookup(ENV_OPA_BINARY)
            .or(file.opa.binary)
            .unwrap_or_else(|| DEFAULT_OPA_BINARY.to_string());

        Ok(Self {
            host,
            org,
            api_token,
            max_workers,
            timeout: Duration::from_secs(timeout_secs),
            opa_binary: PathBuf::from(opa_binary),
            opa_v0_compatible: file.opa.v0_compatible.unwrap_or(false),
        })
    }
}

fn pick(flag: &Option<String>, env: Option<String>, file: Option<String>) -> Option<String> {
    flag.clone()
        .filter(|v| !v.trim().is_empty())
        .or(env)
        .or(file.filter(|v| !v.trim().is_empty()))
}

/// The file to read, and whether the user named it explicitly.
fn config_path(
    overrides: &Overrides,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Option<(PathBuf, bool)> {
    if let Some(path) = &overrides.config_file {
        return Some((path.clone(), true));
    }
    if let Some(path) = lookup(ENV_CONFIG_FILE) {
        return Some((PathBuf::from(path), true));
    }
    lookup("HOME").map(|home| (PathBuf::from(home).join(".config/trailgate/config.toml"), false))
}

fn read_config_file(
    overrides: &Overrides,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<ConfigFile, ConfigError> {
    let Some((path, explicit)) = config_path(overrides, lookup) else {
        return Ok(ConfigFile::default());
    };
    if !explicit && !path.exists() {
        return Ok(ConfigFile::default());
    }
    debug!(path = %path.display(), "reading config file");
    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
}
