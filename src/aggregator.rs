//! Concurrent discovery across both sources.
//!
//! Each source's native payload is converted into [`Candidate`] here; a failing
//! source contributes an empty list and a warning instead of failing the run.

use crate::collaborators::DiscoverySource;
use crate::errors::AppError;
use crate::models::*;
use crate::resilience::{RetryPolicy, UpstreamError, UpstreamGuard};
use std::sync::Arc;

/// Labeled candidate lists from one aggregation round.
#[derive(Debug, Clone, Default)]
pub struct AggregatedCandidates {
    pub source_a: Vec<Candidate>,
    pub source_b: Vec<Candidate>,
    pub warnings: Vec<PipelineWarning>,
    pub failed_sources: Vec<Source>,
}

impl AggregatedCandidates {
    /// True when both sources failed; the run cannot produce anything.
    pub fn all_failed(&self) -> bool {
        self.failed_sources.contains(&Source::SourceA) && self.failed_sources.contains(&Source::SourceB)
    }
}

pub struct SourceAggregator {
    source_a: Arc<dyn DiscoverySource>,
    source_b: Arc<dyn DiscoverySource>,
    guard_a: UpstreamGuard,
    guard_b: UpstreamGuard,
}

impl SourceAggregator {
    /// Each backend must report the slot it is wired into.
    pub fn new(
        source_a: Arc<dyn DiscoverySource>,
        source_b: Arc<dyn DiscoverySource>,
        policy: RetryPolicy,
    ) -> Result<Self, AppError> {
        for (slot, backend) in [(Source::SourceA, &source_a), (Source::SourceB, &source_b)] {
            if backend.source() != slot {
                return Err(AppError::InternalError(format!(
                    "{} backend wired into the {} slot",
                    backend.source(),
                    slot
                )));
            }
        }
        Ok(Self {
            guard_a: UpstreamGuard::new(source_a.source().to_string(), policy.clone()),
            guard_b: UpstreamGuard::new(source_b.source().to_string(), policy),
            source_a,
            source_b,
        })
    }

    /// Queries both sources concurrently and waits for both to settle.
    pub async fn aggregate(&self, query: &DiscoveryQuery) -> AggregatedCandidates {
        let (result_a, result_b) = tokio::join!(
            fetch_candidates(self.source_a.as_ref(), &self.guard_a, query),
            fetch_candidates(self.source_b.as_ref(), &self.guard_b, query),
        );

        let mut aggregated = AggregatedCandidates::default();
        let labelled = [(self.source_a.source(), result_a), (self.source_b.source(), result_b)];
        for (source, result) in labelled {
            match result {
                Ok(candidates) => {
                    tracing::info!("{} produced {} candidate(s)", source, candidates.len());
                    match source {
                        Source::SourceA => aggregated.source_a = candidates,
                        Source::SourceB => aggregated.source_b = candidates,
                    }
                }
                Err(e) => {
                    tracing::warn!("{} unavailable, continuing without it: {}", source, e);
                    aggregated.failed_sources.push(source);
                    aggregated.warnings.push(PipelineWarning {
                        stage: "aggregation".to_string(),
                        source: Some(source),
                        message: e.to_string(),
                    });
                }
            }
        }
        aggregated
    }
}

async fn fetch_candidates(
    backend: &dyn DiscoverySource,
    guard: &UpstreamGuard,
    query: &DiscoveryQuery,
) -> Result<Vec<Candidate>, UpstreamError> {
    let source = backend.source();
    let payloads = guard.call(|| backend.search(query)).await?;

    let mut candidates = Vec::with_capacity(payloads.len());
    for payload in payloads {
        match into_candidate(source, payload, candidates.len()) {
            Some(candidate) => candidates.push(candidate),
            None => tracing::debug!("Skipping {} result without a usable name", source),
        }
    }
    Ok(candidates)
}

/// Converts one native payload into a [`Candidate`]. Results without a name are dropped.
pub fn into_candidate(source: Source, payload: SourcePayload, rank: usize) -> Option<Candidate> {
    match payload {
        SourcePayload::SearchHit(hit) => {
            let parsed = parse_hit_title(&hit.title)?;
            Some(Candidate::new(
                source,
                parsed.name,
                parsed.organization,
                parsed.title,
                Some(hit.link),
                None,
                rank,
            ))
        }
        SourcePayload::ProfileRecord(record) => {
            if record.full_name.trim().is_empty() {
                return None;
            }
            let profile = ProfileData {
                full_name: record.full_name.clone(),
                headline: record.job_title.clone(),
                current_company: record.company_name.clone(),
                summary: record.summary.clone(),
                location: record.location.clone(),
                connections: record.connections,
                extra: serde_json::to_value(&record).unwrap_or_default(),
            };
            Some(Candidate::new(
                source,
                record.full_name,
                record.company_name.unwrap_or_default(),
                record.job_title.unwrap_or_default(),
                record.profile_url,
                Some(profile),
                rank,
            ))
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct ParsedHitTitle {
    pub name: String,
    pub title: String,
    pub organization: String,
}

/// Splits a profile page title such as `"Jane Doe - CFO - Example Health | LinkedIn"`
/// or `"Jane Doe - CFO at Example Health"` into name, title and organization.
pub fn parse_hit_title(raw: &str) -> Option<ParsedHitTitle> {
    let head = raw.split('|').next().unwrap_or_default();
    let head = head.replace(" – ", " - ").replace(" — ", " - ");
    let parts: Vec<&str> = head.split(" - ").map(str::trim).collect();

    let name = parts.first().copied().unwrap_or_default();
    if name.is_empty() {
        return None;
    }

    let (title, organization) = match parts.len() {
        0 | 1 => (String::new(), String::new()),
        2 => split_title_at(parts[1]),
        _ => (parts[1].to_string(), parts[2..].join(" - ")),
    };

    Some(ParsedHitTitle {
        name: name.to_string(),
        title,
        organization,
    })
}

fn split_title_at(text: &str) -> (String, String) {
    let lower = text.to_ascii_lowercase();
    match lower.rfind(" at ") {
        Some(idx) => (
            text[..idx].trim().to_string(),
            text[idx + 4..].trim().to_string(),
        ),
        None => (text.trim().to_string(), String::new()),
    }
}
