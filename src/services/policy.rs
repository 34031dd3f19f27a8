use crate::domain::models::Decision;
use crate::error::EvalError;
use serde_json::Value;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// A Rego policy read from disk and checked for the shape every policy must
/// have: `package policy` with an `allow` rule.
#[derive(Debug, Clone)]
pub struct PolicySource {
    pub path: PathBuf,
    pub text: String,
}

impl PolicySource {
    pub fn load(path: &Path) -> Result<Self, EvalError> {
        let text =
            std::fs::read_to_string(path).map_err(|source| EvalError::PolicySourceNotFound {
                path: path.to_path_buf(),
                source,
            })?;
        validate_policy(&text)?;
        Ok(Self {
            path: path.to_path_buf(),
            text,
        })
    }
}

/// Evaluates a policy against a JSON input. A denial is a `Decision`, never
/// an `Err`.
pub trait PolicyEvaluator {
    fn evaluate(&self, input: &Value, policy: &PolicySource) -> Result<Decision, EvalError>;
}

fn strip_comment(line: &str) -> &str {
    line.split('#').next().unwrap_or("").trim()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn declares_allow(line: &str) -> bool {
    let rule = line.strip_prefix("default ").map(str::trim_start).unwrap_or(line);
    match rule.strip_prefix("allow") {
        Some(rest) => !rest.starts_with(is_ident_char),
        None => false,
    }
}

/// Cheap structural check run before any trail is fetched. Full parsing and
/// compilation is left to the evaluator.
pub fn validate_policy(text: &str) -> Result<(), EvalError> {
    let lines: Vec<&str> = text.lines().map(strip_comment).collect();

    let package = lines
        .iter()
        .find_map(|l| l.strip_prefix("package "))
        .map(str::trim)
        .ok_or_else(|| EvalError::PolicyCompile("policy must declare 'package policy'".to_string()))?;
    if package != "policy" {
        return Err(EvalError::PolicyCompile(format!(
            "policy package must be 'package policy', got '{package}'"
        )));
    }

    if !lines.iter().any(|l| declares_allow(l)) {
        return Err(EvalError::PolicyCompile(
            "policy must declare an 'allow' rule".to_string(),
        ));
    }
    Ok(())
}

/// Shells out to the OPA CLI, feeding the input on stdin.
pub struct OpaEvaluator {
    binary: PathBuf,
    v0_compatible: bool,
}

impl OpaEvaluator {
    pub fn new(binary: impl Into<PathBuf>, v0_compatible: bool) -> Self {
        Self {
            binary: binary.into(),
            v0_compatible,
        }
    }

    fn fault(&self, what: &str, err: impl std::fmt::Display) -> EvalError {
        EvalError::PolicyEvaluation(format!("{what} {}: {err}", self.binary.display()))
    }
}

impl PolicyEvaluator for OpaEvaluator {
    fn evaluate(&self, input: &Value, policy: &PolicySource) -> Result<Decision, EvalError> {
        // opa only compiles `--data` files that carry the .rego extension
        let staged;
        let module_path = if policy.path.extension().is_some_and(|e| e == "rego") {
            policy.path.clone()
        } else {
            let mut file = tempfile::Builder::new()
                .suffix(".rego")
                .tempfile()
                .map_err(|e| self.fault("failed to stage policy for", e))?;
            file.write_all(policy.text.as_bytes())
                .map_err(|e| self.fault("failed to stage policy for", e))?;
            let path = file.path().to_path_buf();
            staged = file;
            debug!(staged = %staged.path().display(), "policy staged with .rego extension");
            path
        };

        let mut cmd = Command::new(&self.binary);
        cmd.args(["eval", "--format", "json", "--stdin-input", "--data"])
            .arg(&module_path);
        if self.v0_compatible {
            cmd.arg("--v0-compatible");
        }
        cmd.arg("data.policy")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(binary = %self.binary.display(), policy = %policy.path.display(), "running opa eval");
        let mut child = cmd.spawn().map_err(|e| self.fault("failed to run", e))?;
        let payload = serde_json::to_vec(input)?;
        if let Some(mut stdin) = child.stdin.take() {
            // opa may exit on a compile error before reading its input
            match stdin.write_all(&payload) {
                Err(e) if e.kind() != ErrorKind::BrokenPipe => {
                    return Err(self.fault("failed to send input to", e));
                }
                _ => {}
            }
        }
        let output = child
            .wait_with_output()
            .map_err(|e| self.fault("failed to wait for", e))?;

        if !output.status.success() {
            return Err(classify_failure(
                &output.stdout,
                &output.stderr,
                output.status.code(),
            ));
        }
        decision_from_output(&output.stdout)
    }
}

/// Reads `allow`/`violations` from `opa eval --format json` output. A missing
/// or non-boolean `allow` means deny; violations are only read on deny and
/// non-string entries are dropped.
pub fn decision_from_output(stdout: &[u8]) -> Result<Decision, EvalError> {
    let out: Value = serde_json::from_slice(stdout)
        .map_err(|e| EvalError::PolicyEvaluation(format!("unreadable opa output: {e}")))?;
    let package = out.pointer("/result/0/expressions/0/value");
    let allow = package
        .and_then(|p| p.get("allow"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if allow {
        return Ok(Decision::allowed());
    }
    let violations = package
        .and_then(|p| p.get("violations"))
        .and_then(Value::as_array)
        .map(|vs| {
            vs.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    Ok(Decision::denied(violations))
}

/// Maps a failed `opa eval` run to a compile error (any `rego_*` code) or an
/// evaluation fault (everything else).
pub fn classify_failure(stdout: &[u8], stderr: &[u8], code: Option<i32>) -> EvalError {
    let errors = serde_json::from_slice::<Value>(stdout)
        .ok()
        .and_then(|v| v.get("errors").and_then(Value::as_array).cloned())
        .unwrap_or_default();

    if errors.is_empty() {
        let stderr = String::from_utf8_lossy(stderr).trim().to_string();
        return EvalError::PolicyEvaluation(if stderr.is_empty() {
            format!("opa exited with status {}", code.unwrap_or(-1))
        } else {
            stderr
        });
    }

    let mut compile = false;
    let messages: Vec<String> = errors
        .iter()
        .map(|e| {
            let code = e.get("code").and_then(Value::as_str).unwrap_or("error");
            compile |= code.starts_with("rego_");
            let message = e.get("message").and_then(Value::as_str).unwrap_or("");
            match e.pointer("/location/row").and_then(Value::as_u64) {
                Some(row) => format!("{code}: {message} (line {row})"),
                None => format!("{code}: {message}"),
            }
        })
        .collect();
    let joined = messages.join("; ");
    if compile {
        EvalError::PolicyCompile(joined)
    } else {
        EvalError::PolicyEvaluation(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALLOW_ALL: &str = "package policy\n\nallow := true\n";
    const DENY_ALL: &str = "package policy\n\nallow := false\n\nviolations contains msg if {\n\tmsg := \"always denied\"\n}\n";

    #[test]
    fn accepts_well_formed_policies() {
        validate_policy(ALLOW_ALL).unwrap();
        validate_policy(DENY_ALL).unwrap();
        validate_policy("# header\npackage policy\nimport rego.v1\ndefault allow := false\nallow if { input.trail }\n")
            .unwrap();
    }

    #[test]
    fn rejects_wrong_package() {
        let err = validate_policy("package wrong\n\nallow = true\n").unwrap_err();
        assert!(err.to_string().contains("package policy"), "{err}");
        assert!(err.to_string().contains("'wrong'"), "{err}");
    }

    #[test]
    fn rejects_missing_package_and_missing_allow() {
        assert!(validate_policy("allow = true\n").is_err());
        let err =
            validate_policy("package policy\n\nviolations contains msg if {\n\tmsg := \"no allow rule\"\n}\n")
                .unwrap_err();
        assert!(err.to_string().contains("allow"), "{err}");
        // a rule merely prefixed with allow is not an allow rule
        assert!(validate_policy("package policy\nallowed = true\n").is_err());
        // commented out rules do not count
        assert!(validate_policy("package policy\n# allow = true\n").is_err());
    }

    #[test]
    fn load_reports_missing_file_distinctly() {
        let err = PolicySource::load(Path::new("/definitely/not/here.rego")).unwrap_err();
        assert!(matches!(err, EvalError::PolicySourceNotFound { .. }));
    }

    #[test]
    fn load_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allow.rego");
        std::fs::write(&path, ALLOW_ALL).unwrap();
        let policy = PolicySource::load(&path).unwrap();
        assert_eq!(policy.text, ALLOW_ALL);

        let bad = dir.path().join("bad.rego");
        std::fs::write(&bad, "package other\nallow = true\n").unwrap();
        assert!(matches!(
            PolicySource::load(&bad).unwrap_err(),
            EvalError::PolicyCompile(_)
        ));
    }

    #[test]
    fn reads_allow_from_opa_output() {
        let out = json!({"result": [{"expressions": [{"value": {"allow": true, "violations": ["x"]}, "text": "data.policy"}]}]});
        let d = decision_from_output(out.to_string().as_bytes()).unwrap();
        assert_eq!(d, Decision::allowed());
    }

    #[test]
    fn reads_violations_on_deny_and_drops_non_strings() {
        let out = json!({"result": [{"expressions": [{"value": {"allow": false, "violations": ["always denied", 3, "second"]}}]}]});
        let d = decision_from_output(out.to_string().as_bytes()).unwrap();
        assert!(!d.allow);
        assert_eq!(d.violations, vec!["always denied", "second"]);
    }

    #[test]
    fn undefined_result_is_a_deny_without_violations() {
        let d = decision_from_output(b"{}").unwrap();
        assert_eq!(d, Decision::denied(vec![]));
        let d = decision_from_output(
            json!({"result": [{"expressions": [{"value": {"allow": "yes"}}]}]})
                .to_string()
                .as_bytes(),
        )
        .unwrap();
        assert!(!d.allow);
    }

    #[test]
    fn garbage_output_is_a_fault_not_a_deny() {
        assert!(matches!(
            decision_from_output(b"not json").unwrap_err(),
            EvalError::PolicyEvaluation(_)
        ));
    }

    #[test]
    fn rego_error_codes_are_compile_errors() {
        let stdout = json!({"errors": [{
            "message": "unexpected { token",
            "code": "rego_parse_error",
            "location": {"file": "policy.rego", "row": 3, "col": 9}
        }]});
        let err = classify_failure(stdout.to_string().as_bytes(), b"", Some(1));
        match err {
            EvalError::PolicyCompile(msg) => {
                assert_eq!(msg, "rego_parse_error: unexpected { token (line 3)")
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn other_failures_are_evaluation_faults() {
        let stdout = json!({"errors": [{"message": "functions must not produce multiple outputs", "code": "eval_conflict_error"}]});
        assert!(matches!(
            classify_failure(stdout.to_string().as_bytes(), b"", Some(1)),
            EvalError::PolicyEvaluation(_)
        ));
        match classify_failure(b"", b"opa: command crashed\n", Some(2)) {
            EvalError::PolicyEvaluation(msg) => assert_eq!(msg, "opa: command crashed"),
            other => panic!("unexpected: {other}"),
        }
        match classify_failure(b"", b"", None) {
            EvalError::PolicyEvaluation(msg) => assert_eq!(msg, "opa exited with status -1"),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn missing_opa_binary_is_a_fault() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allow.rego");
        std::fs::write(&path, ALLOW_ALL).unwrap();
        let policy = PolicySource::load(&path).unwrap();
        let opa = OpaEvaluator::new(dir.path().join("no-such-opa"), false);
        let err = opa.evaluate(&json!({}), &policy).unwrap_err();
        assert!(matches!(err, EvalError::PolicyEvaluation(_)), "{err}");
    }
}
