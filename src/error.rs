//! Error taxonomy for the evaluation pipeline.
//!
//! Each layer owns one enum: `FetchError` for the trail API, `ConfigError`
//! for settings, `EvalError` for everything the pipeline can report. A policy
//! denial is not an error and never appears here.
//!
//! Messages never repeat their cause; the binary prints the whole chain.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Trail with name '{trail}' does not exist for Organization '{org}' and Flow '{flow}'")]
    TrailNotFound {
        trail: String,
        org: String,
        flow: String,
    },
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("no detail record returned for attestation {0}")]
    EmptyDetail(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("failed to parse response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid api url '{0}'")]
    Url(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{setting} is required: pass --{flag} or set {env}")]
    Missing {
        setting: &'static str,
        flag: &'static str,
        env: &'static str,
    },
    #[error("failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value '{value}' for {setting}")]
    Invalid { setting: &'static str, value: String },
}

#[derive(thiserror::Error, Debug)]
pub enum EvalError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid attestation selector '{selector}': {reason}")]
    FilterParse {
        selector: String,
        reason: &'static str,
    },
    #[error("unsupported output format '{0}': must be one of [table, json]")]
    UnsupportedFormat(String),
    #[error("Trail with name '{trail}' does not exist for Organization '{org}' and Flow '{flow}'")]
    TrailNotFound {
        trail: String,
        org: String,
        flow: String,
    },
    #[error("failed to fetch trail '{trail}'")]
    TrailFetch {
        trail: String,
        #[source]
        source: FetchError,
    },
    #[error("failed to fetch detail for attestation {attestation_id}")]
    DetailFetch {
        attestation_id: String,
        #[source]
        source: FetchError,
    },
    #[error("failed to read policy file {}", .path.display())]
    PolicySourceNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to compile policy: {0}")]
    PolicyCompile(String),
    #[error("policy evaluation failed: {0}")]
    PolicyEvaluation(String),
    #[error("failed to render decision")]
    Render(#[from] serde_json::Error),
}

impl EvalError {
    /// Lifts a trail-level fetch failure, keeping not-found distinct from
    /// transport and API failures.
    pub fn from_trail_fetch(trail: &str, err: FetchError) -> Self {
        match err {
            FetchError::TrailNotFound { trail, org, flow } => {
                EvalError::TrailNotFound { trail, org, flow }
            }
            other => EvalError::TrailFetch {
                trail: trail.to_string(),
                source: other,
            },
        }
    }
}
