use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Untyped fields carried through verbatim from the API.
pub type Fields = BTreeMap<String, Value>;

/// Keyed by `attestation_name`; the key always equals the value's name.
pub type AttestationMap = BTreeMap<String, EnrichedAttestation>;

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

// ---- raw API shapes -------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct RawTrail {
    pub name: String,
    #[serde(default)]
    pub flow: Option<String>,
    #[serde(default)]
    pub compliance_status: Option<RawComplianceStatus>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawComplianceStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub attestations_statuses: Vec<RawAttestation>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artifacts_statuses: BTreeMap<String, RawArtifactStatus>,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawArtifactStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub attestations_statuses: Vec<RawAttestation>,
    #[serde(flatten)]
    pub extra: Fields,
}

/// One entry of an `attestations_statuses` list. Server order is kept only
/// while building; it has no meaning to policies.
///
/// Only the name is typed. Everything else, explicit nulls included, is
/// carried to the policy exactly as the server sent it.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawAttestation {
    #[serde(default)]
    pub attestation_name: Option<String>,
    #[serde(flatten)]
    pub extra: Fields,
}

/// Fields only the per-attestation endpoint returns.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationDetail {
    pub attestation_id: String,
    pub fields: Fields,
}

// ---- normalized document --------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EnrichedAttestation {
    pub attestation_name: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl EnrichedAttestation {
    /// `None` when the raw entry has no name to key it by.
    pub fn from_raw(raw: RawAttestation) -> Option<Self> {
        Some(Self {
            attestation_name: raw.attestation_name?,
            fields: raw.extra,
        })
    }

    /// Null for attestations the flow template expects but nobody reported yet.
    pub fn attestation_id(&self) -> Option<&str> {
        self.fields.get("attestation_id").and_then(Value::as_str)
    }

    pub fn is_compliant(&self) -> Option<bool> {
        self.fields.get("is_compliant").and_then(Value::as_bool)
    }

    /// Adds detail fields whose keys the record does not have yet. A key that
    /// is present, even as null, is never overwritten; neither is the name.
    pub fn absorb(&mut self, detail: &AttestationDetail) {
        for (key, value) in &detail.fields {
            if key == "attestation_name" {
                continue;
            }
            self.fields
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ArtifactStatus {
    #[serde(default)]
    pub attestations_statuses: AttestationMap,
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ComplianceStatus {
    #[serde(default)]
    pub attestations_statuses: AttestationMap,
    #[serde(default)]
    pub artifacts_statuses: BTreeMap<String, ArtifactStatus>,
    #[serde(flatten)]
    pub extra: Fields,
}

/// One trail in the shape policies consume.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ComplianceDocument {
    pub name: String,
    pub flow: String,
    pub compliance_status: ComplianceStatus,
    #[serde(flatten)]
    pub extra: Fields,
}

impl ComplianceDocument {
    /// SHA-256 of the serialized document. Maps are ordered, so equal
    /// documents always hash equal.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Trails in command-line order. Never sorted or de-duplicated.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct BatchDocument {
    pub trails: Vec<ComplianceDocument>,
}

/// The value handed to the policy as `input`.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub enum PolicyInput {
    #[serde(rename = "trail")]
    Trail(ComplianceDocument),
    #[serde(rename = "trails")]
    Trails(Vec<ComplianceDocument>),
}

impl From<ComplianceDocument> for PolicyInput {
    fn from(doc: ComplianceDocument) -> Self {
        PolicyInput::Trail(doc)
    }
}

impl From<BatchDocument> for PolicyInput {
    fn from(batch: BatchDocument) -> Self {
        PolicyInput::Trails(batch.trails)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allow: bool,
    #[serde(default)]
    pub violations: Vec<String>,
}

impl Decision {
    /// Violations are dropped when the policy allows.
    pub fn new(allow: bool, violations: Vec<String>) -> Self {
        Self {
            allow,
            violations: if allow { Vec::new() } else { violations },
        }
    }

    pub fn allowed() -> Self {
        Self::new(true, Vec::new())
    }

    pub fn denied(violations: Vec<String>) -> Self {
        Self::new(false, violations)
    }
}

/// `config.toml`. Every key is optional; unknown keys are rejected.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub host: Option<String>,
    pub org: Option<String>,
    pub api_token: Option<String>,
    pub max_workers: Option<usize>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub opa: OpaSection,
}

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OpaSection {
    pub binary: Option<String>,
    pub v0_compatible: Option<bool>,
}
