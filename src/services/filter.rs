use crate::domain::models::{AttestationMap, BatchDocument, ComplianceDocument};
use crate::error::EvalError;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// `name`: a trail-level attestation.
    Trail(String),
    /// `artifact.name`: an attestation on one artifact.
    Artifact { artifact: String, attestation: String },
}

/// Parsed `--attestations` selectors. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    selectors: Vec<Selector>,
}

impl FilterSpec {
    /// Parses selectors, splitting artifact-scoped ones at the first `.`.
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Self, EvalError> {
        let mut selectors = Vec::with_capacity(raw.len());
        for s in raw {
            selectors.push(parse_selector(s.as_ref())?);
        }
        Ok(Self { selectors })
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    pub fn trail_scoped(&self) -> BTreeSet<&str> {
        self.selectors
            .iter()
            .filter_map(|s| match s {
                Selector::Trail(name) => Some(name.as_str()),
                Selector::Artifact { .. } => None,
            })
            .collect()
    }

    pub fn artifact_scoped(&self, artifact: &str) -> BTreeSet<&str> {
        self.selectors
            .iter()
            .filter_map(|s| match s {
                Selector::Artifact {
                    artifact: a,
                    attestation,
                } if a == artifact => Some(attestation.as_str()),
                _ => None,
            })
            .collect()
    }
}

fn parse_selector(raw: &str) -> Result<Selector, EvalError> {
    let invalid = |reason| EvalError::FilterParse {
        selector: raw.to_string(),
        reason,
    };
    if raw.is_empty() {
        return Err(invalid("selector is empty"));
    }
    if raw.trim() != raw {
        return Err(invalid("selector has leading or trailing whitespace"));
    }
    match raw.split_once('.') {
        None => Ok(Selector::Trail(raw.to_string())),
        Some((artifact, attestation)) if !artifact.is_empty() && !attestation.is_empty() => {
            Ok(Selector::Artifact {
                artifact: artifact.to_string(),
                attestation: attestation.to_string(),
            })
        }
        Some(_) => Err(invalid("expected NAME or ARTIFACT.NAME")),
    }
}

/// Returns a copy of `doc` holding only the selected attestations.
///
/// An empty spec passes everything through. Otherwise selection is
/// exclusive per scope: no trail-scoped selector empties the trail-level map,
/// and an artifact nobody selected keeps its key with an empty map. Names
/// that match nothing are ignored.
pub fn filter(doc: &ComplianceDocument, spec: &FilterSpec) -> ComplianceDocument {
    let mut out = doc.clone();
    if spec.is_empty() {
        return out;
    }
    let status = &mut out.compliance_status;
    retain_named(&mut status.attestations_statuses, &spec.trail_scoped());
    for (artifact, artifact_status) in status.artifacts_statuses.iter_mut() {
        retain_named(
            &mut artifact_status.attestations_statuses,
            &spec.artifact_scoped(artifact),
        );
    }
    out
}

/// Applies the same spec to every trail independently.
pub fn filter_batch(batch: &BatchDocument, spec: &FilterSpec) -> BatchDocument {
    BatchDocument {
        trails: batch.trails.iter().map(|doc| filter(doc, spec)).collect(),
    }
}

fn retain_named(map: &mut AttestationMap, keep: &BTreeSet<&str>) {
    map.retain(|name, _| keep.contains(name.as_str()));
}
