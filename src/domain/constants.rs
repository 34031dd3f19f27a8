pub const DEFAULT_HOST: &str = "https://app.kosli.com";
pub const DEFAULT_OPA_BINARY: &str = "opa";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const MAX_WORKERS_CAP: usize = 8;

pub const ENV_CONFIG_FILE: &str = "TRAILGATE_CONFIG_FILE";
pub const ENV_HOST: &str = "TRAILGATE_HOST";
pub const ENV_ORG: &str = "TRAILGATE_ORG";
pub const ENV_API_TOKEN: &str = "TRAILGATE_API_TOKEN";
pub const ENV_MAX_WORKERS: &str = "TRAILGATE_MAX_WORKERS";
pub const ENV_OPA_BINARY: &str = "TRAILGATE_OPA_BINARY";
