use crate::domain::models::{
    ArtifactStatus, AttestationMap, BatchDocument, ComplianceDocument, ComplianceStatus,
    EnrichedAttestation, RawAttestation, RawTrail,
};
use crate::error::EvalError;
use crate::services::api::TrailSource;
use crate::services::fanout::fetch_all;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Turns raw trails from a [`TrailSource`] into compliance documents.
pub struct DocumentBuilder<'a, S: TrailSource + ?Sized> {
    source: &'a S,
    workers: usize,
}

impl<'a, S: TrailSource + ?Sized> DocumentBuilder<'a, S> {
    pub fn new(source: &'a S, workers: usize) -> Self {
        Self {
            source,
            workers: workers.max(1),
        }
    }

    /// Fetches, normalizes and rehydrates one trail. Any failed detail fetch
    /// fails the whole build; a partially rehydrated document is never
    /// returned.
    pub fn build(&self, trail: &str) -> Result<ComplianceDocument, EvalError> {
        let raw = self
            .source
            .fetch_trail(trail)
            .map_err(|e| EvalError::from_trail_fetch(trail, e))?;
        let mut doc = normalize(raw);
        self.rehydrate(&mut doc)?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(trail, digest = %doc.digest()?, "document built");
        }
        Ok(doc)
    }

    /// Builds every trail in the given order and stops at the first error.
    pub fn build_batch(&self, trails: &[String]) -> Result<BatchDocument, EvalError> {
        let mut built = Vec::with_capacity(trails.len());
        for trail in trails {
            built.push(self.build(trail)?);
        }
        Ok(BatchDocument { trails: built })
    }

    fn rehydrate(&self, doc: &mut ComplianceDocument) -> Result<(), EvalError> {
        let ids = attestation_ids(doc);
        if ids.is_empty() {
            return Ok(());
        }
        debug!(trail = %doc.name, attestations = ids.len(), "rehydrating");
        let details = fetch_all(&ids, self.workers, |id| {
            self.source.fetch_attestation_detail(id)
        })
        .map_err(|(attestation_id, source)| EvalError::DetailFetch {
            attestation_id,
            source,
        })?;

        for att in attestations_mut(doc) {
            let detail = att.attestation_id().and_then(|id| details.get(id));
            if let Some(detail) = detail {
                att.absorb(detail);
            }
        }
        Ok(())
    }
}

/// Converts the server's ordered lists into name-keyed maps.
///
/// Every artifact in the raw trail keeps its key, even with no attestations.
/// Trail-level entries stay at trail level whatever `artifact_name` they carry.
pub fn normalize(raw: RawTrail) -> ComplianceDocument {
    let status = raw.compliance_status.unwrap_or_default();

    let mut artifacts: BTreeMap<String, ArtifactStatus> = BTreeMap::new();
    for (artifact, artifact_status) in status.artifacts_statuses {
        let mut map = AttestationMap::new();
        insert_all(&mut map, &raw.name, &artifact, artifact_status.attestations_statuses);
        artifacts.insert(
            artifact,
            ArtifactStatus {
                attestations_statuses: map,
                extra: artifact_status.extra,
            },
        );
    }

    let mut trail_level = AttestationMap::new();
    insert_all(&mut trail_level, &raw.name, "", status.attestations_statuses);

    ComplianceDocument {
        flow: raw.flow.unwrap_or_default(),
        compliance_status: ComplianceStatus {
            attestations_statuses: trail_level,
            artifacts_statuses: artifacts,
            extra: status.extra,
        },
        name: raw.name,
        extra: raw.extra,
    }
}

fn insert_all(map: &mut AttestationMap, trail: &str, artifact: &str, entries: Vec<RawAttestation>) {
    for entry in entries {
        let Some(att) = EnrichedAttestation::from_raw(entry) else {
            debug!(trail, artifact, "skipping attestation status without a name");
            continue;
        };
        let key = att.attestation_name.clone();
        if map.insert(key.clone(), att).is_some() {
            warn!(trail, artifact, attestation = %key, "duplicate attestation name, keeping the later entry");
        }
    }
}

fn attestation_ids(doc: &ComplianceDocument) -> Vec<String> {
    let status = &doc.compliance_status;
    let trail_level = status.attestations_statuses.values();
    let artifact_level = status
        .artifacts_statuses
        .values()
        .flat_map(|a| a.attestations_statuses.values());
    trail_level
        .chain(artifact_level)
        .filter_map(|att| att.attestation_id().map(str::to_string))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn attestations_mut(doc: &mut ComplianceDocument) -> impl Iterator<Item = &mut EnrichedAttestation> {
    let status = &mut doc.compliance_status;
    let artifact_level = status
        .artifacts_statuses
        .values_mut()
        .flat_map(|a| a.attestations_statuses.values_mut());
    status.attestations_statuses.values_mut().chain(artifact_level)
}
