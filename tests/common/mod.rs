#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;
use trailgate::domain::models::{AttestationDetail, Decision, Fields, RawTrail};
use trailgate::error::{EvalError, FetchError};
use trailgate::services::api::TrailSource;
use trailgate::services::policy::{PolicyEvaluator, PolicySource};

pub const ALLOW_ALL: &str = "package policy\n\nallow := true\n";
pub const DENY_ALL: &str =
    "package policy\n\nallow := false\n\nviolations contains msg if {\n\tmsg := \"always denied\"\n}\n";

/// Unreachable API host: nothing listens on the discard port.
pub const DEAD_HOST: &str = "http://127.0.0.1:9";

pub struct TestEnv {
    tmp: TempDir,
    pub home: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let home = tmp.path().join("home");
        fs::create_dir_all(&home).expect("create isolated home");
        Self { tmp, home }
    }

    /// The binary with an isolated HOME and none of the caller's settings.
    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("trailgate");
        cmd.env("HOME", &self.home)
            .env_remove("RUST_LOG")
            .env_remove("TRAILGATE_CONFIG_FILE")
            .env_remove("TRAILGATE_HOST")
            .env_remove("TRAILGATE_ORG")
            .env_remove("TRAILGATE_API_TOKEN")
            .env_remove("TRAILGATE_MAX_WORKERS")
            .env_remove("TRAILGATE_OPA_BINARY")
            .env_remove("HTTP_PROXY")
            .env_remove("http_proxy")
            .env_remove("ALL_PROXY")
            .env_remove("all_proxy");
        cmd
    }

    /// `cmd()` pointed at a dead host with org and token set.
    pub fn configured(&self) -> Command {
        let mut cmd = self.cmd();
        cmd.env("TRAILGATE_HOST", DEAD_HOST)
            .env("TRAILGATE_ORG", "acme")
            .env("TRAILGATE_API_TOKEN", "secret");
        cmd
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.tmp.path().join(name);
        fs::write(&path, contents).expect("write fixture");
        path
    }

    /// An executable standing in for `opa` that drains stdin and prints
    /// `output` as its eval result.
    #[cfg(unix)]
    pub fn fake_opa(&self, output: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let script = format!("#!/bin/sh\ncat > /dev/null\nprintf '%s\\n' '{output}'\n");
        let path = self.write("fake-opa", &script);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake opa");
        path
    }
}

/// Answers every request on a local port with `200` and `body`. Returns the
/// base URL to use as the API host.
pub fn serve_json(body: Value) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local api");
    let addr = listener.local_addr().expect("local api address");
    let body = body.to_string();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut line = String::new();
            while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
                if line == "\r\n" {
                    break;
                }
                line.clear();
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    format!("http://{addr}")
}

/// In-memory trail API. Trails and details are plain JSON as the server
/// would send them.
#[derive(Default)]
pub struct MemorySource {
    trails: HashMap<String, Value>,
    details: HashMap<String, Value>,
    pub trail_fetches: Mutex<Vec<String>>,
    pub detail_fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trail(mut self, name: &str, body: Value) -> Self {
        self.trails.insert(name.to_string(), body);
        self
    }

    pub fn detail(mut self, id: &str, fields: Value) -> Self {
        self.details.insert(id.to_string(), fields);
        self
    }

    pub fn detail_fetch_count(&self) -> usize {
        self.detail_fetches.load(Ordering::SeqCst)
    }
}

impl TrailSource for MemorySource {
    fn fetch_trail(&self, name: &str) -> Result<RawTrail, FetchError> {
        self.trail_fetches
            .lock()
            .expect("fetch log")
            .push(name.to_string());
        let body = self
            .trails
            .get(name)
            .ok_or_else(|| FetchError::TrailNotFound {
                trail: name.to_string(),
                org: "acme".to_string(),
                flow: "release".to_string(),
            })?;
        Ok(serde_json::from_value(body.clone()).expect("fixture trail"))
    }

    fn fetch_attestation_detail(&self, id: &str) -> Result<AttestationDetail, FetchError> {
        self.detail_fetches.fetch_add(1, Ordering::SeqCst);
        match self.details.get(id) {
            Some(fields) => Ok(AttestationDetail {
                attestation_id: id.to_string(),
                fields: serde_json::from_value::<Fields>(fields.clone()).expect("fixture detail"),
            }),
            None => Err(FetchError::Api {
                status: 503,
                message: format!("detail {id} unavailable"),
            }),
        }
    }
}

/// Evaluator returning a fixed decision and keeping the last input it saw.
pub struct ScriptedEvaluator {
    decision: Result<Decision, String>,
    pub seen: Mutex<Option<Value>>,
}

impl ScriptedEvaluator {
    pub fn allow() -> Self {
        Self::with(Ok(Decision::allowed()))
    }

    pub fn deny(violations: &[&str]) -> Self {
        Self::with(Ok(Decision::denied(
            violations.iter().map(|v| v.to_string()).collect(),
        )))
    }

    pub fn compile_error(message: &str) -> Self {
        Self::with(Err(message.to_string()))
    }

    fn with(decision: Result<Decision, String>) -> Self {
        Self {
            decision,
            seen: Mutex::new(None),
        }
    }

    pub fn seen_input(&self) -> Option<Value> {
        self.seen.lock().expect("seen input").clone()
    }
}

impl PolicyEvaluator for ScriptedEvaluator {
    fn evaluate(&self, input: &Value, _policy: &PolicySource) -> Result<Decision, EvalError> {
        *self.seen.lock().expect("seen input") = Some(input.clone());
        self.decision.clone().map_err(EvalError::PolicyCompile)
    }
}

/// A trail with a trail-level `bar` attestation and artifact `cli` carrying
/// `foo`, both with detail records.
pub fn sample_source() -> MemorySource {
    MemorySource::new()
        .trail("T", sample_trail("T"))
        .detail("att-bar", serde_json::json!({"origin_url": "https://ci.example/1"}))
        .detail("att-foo", serde_json::json!({"user_data": {"coverage": 91}}))
}

pub fn sample_trail(name: &str) -> Value {
    serde_json::json!({
        "name": name,
        "flow": "release",
        "compliance_status": {
            "status": "COMPLETE",
            "attestations_statuses": [
                {"attestation_name": "bar", "attestation_type": "generic",
                 "attestation_id": "att-bar", "is_compliant": true}
            ],
            "artifacts_statuses": {
                "cli": {"attestations_statuses": [
                    {"attestation_name": "foo", "attestation_type": "junit",
                     "attestation_id": "att-foo", "is_compliant": true}
                ]}
            }
        }
    })
}
