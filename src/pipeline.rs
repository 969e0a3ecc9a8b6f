//! End-to-end prospect run: discover, merge, enrich, filter, score, queue.

use crate::aggregator::SourceAggregator;
use crate::collaborators::{DiscoverySource, ProfileEnricher, ProspectScorer};
use crate::config::PipelineConfig;
use crate::dedup;
use crate::enrichment::EnrichmentGate;
use crate::errors::AppError;
use crate::filters::{FilterCascade, FilterTarget};
use crate::matcher::TargetOrganization;
use crate::models::*;
use crate::queue::ApprovalQueue;
use crate::resilience::{RetryPolicy, UpstreamGuard};
use crate::scoring::{rank_and_cut, QualificationScorer};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// External systems a pipeline talks to.
pub struct PipelineCollaborators {
    pub source_a: Arc<dyn DiscoverySource>,
    pub source_b: Arc<dyn DiscoverySource>,
    pub enricher: Arc<dyn ProfileEnricher>,
    pub scorer: Arc<dyn ProspectScorer>,
}

pub struct ProspectPipeline {
    config: PipelineConfig,
    aggregator: SourceAggregator,
    enrichment: EnrichmentGate,
    cascade: FilterCascade,
    scorer: QualificationScorer,
    queue: Arc<ApprovalQueue>,
}

impl ProspectPipeline {
    pub fn new(
        config: PipelineConfig,
        policy: RetryPolicy,
        collaborators: PipelineCollaborators,
        queue: Arc<ApprovalQueue>,
    ) -> Result<Self, AppError> {
        let cascade = FilterCascade::from_config(&config)
            .map_err(|e| AppError::InternalError(format!("Invalid filter pattern: {}", e)))?;

        let aggregator =
            SourceAggregator::new(collaborators.source_a, collaborators.source_b, policy.clone())?;
        let enrichment = EnrichmentGate::new(
            collaborators.enricher,
            UpstreamGuard::new("enrichment", policy.clone()),
        );
        let scorer = QualificationScorer::new(
            collaborators.scorer,
            UpstreamGuard::new("scoring", policy),
            config.scoring_concurrency,
        );

        Ok(Self {
            config,
            aggregator,
            enrichment,
            cascade,
            scorer,
            queue,
        })
    }

    pub fn queue(&self) -> &Arc<ApprovalQueue> {
        &self.queue
    }

    /// Runs one discovery round for a target organization.
    ///
    /// Fails only when the target is missing or both discovery sources fail.
    /// Every prospect found ends up in exactly one of `qualified` or `rejected`.
    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineOutcome, AppError> {
        let target_org = request.target_org.trim().to_string();
        if target_org.is_empty() {
            return Err(AppError::BadRequest(
                "target_org is required".to_string(),
            ));
        }

        let region = request
            .region
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        let role_titles = request
            .role_titles
            .as_ref()
            .map(|titles| {
                titles
                    .iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|titles| !titles.is_empty())
            .unwrap_or_else(|| self.config.default_role_titles.clone());

        let run_id = Uuid::new_v4();
        tracing::info!(
            "Starting prospect run {} for '{}' (region: {:?}, {} role title(s))",
            run_id,
            target_org,
            region,
            role_titles.len()
        );

        let query = DiscoveryQuery {
            org_name: target_org.clone(),
            role_titles: role_titles.clone(),
            region: region.clone(),
        };

        let aggregated = self.aggregator.aggregate(&query).await;
        if aggregated.all_failed() {
            let detail = aggregated
                .warnings
                .iter()
                .map(|w| w.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            tracing::error!("Both discovery sources failed for '{}': {}", target_org, detail);
            return Err(AppError::AllSourcesFailed(detail));
        }
        let mut warnings = aggregated.warnings;

        let merged = dedup::deduplicate(&aggregated.source_a, &aggregated.source_b);
        let enriched = self.enrichment.enrich(merged).await;

        let filter_target = FilterTarget {
            organization: TargetOrganization::new(&target_org, &self.config.normalizer),
            region: region
                .clone()
                .filter(|_| request.filter_by_region.unwrap_or(true)),
        };
        let (passed, mut rejected) = self.cascade.apply(enriched, &filter_target);

        let context = TargetContext {
            organization: target_org.clone(),
            region,
            role_titles,
        };
        let (scored, scoring_failures) = self.scorer.score_all(passed, &context).await;
        rejected.extend(scoring_failures);

        let max_results = request.max_results.or(self.config.default_max_results);
        let (qualified, cut) = rank_and_cut(scored, request.min_score, max_results);
        rejected.extend(cut);
        rejected.sort_by_key(|p| p.discovery_index);

        let mut queue_ids = Vec::with_capacity(qualified.len());
        for prospect in &qualified {
            let update = NewPendingUpdate {
                record_type: RecordType::Lead,
                record_id: None,
                field_updates: lead_field_updates(prospect),
                enrichment_type: self.config.enrichment_type.clone(),
            };
            match self.queue.enqueue(update).await {
                Ok(entry) => queue_ids.push(entry.id),
                Err(e) => {
                    tracing::error!("Failed to queue '{}': {}", prospect.full_name, e);
                    warnings.push(PipelineWarning {
                        stage: "queue".to_string(),
                        source: None,
                        message: format!("{}: {}", prospect.full_name, e),
                    });
                }
            }
        }

        tracing::info!(
            "Prospect run {} for '{}' finished: {} qualified, {} rejected, {} queued",
            run_id,
            target_org,
            qualified.len(),
            rejected.len(),
            queue_ids.len()
        );

        Ok(PipelineOutcome {
            run_id,
            target_org,
            qualified,
            rejected,
            queue_ids,
            warnings,
        })
    }
}

/// Proposed Lead fields for a qualified prospect, in a fixed order.
pub fn lead_field_updates(prospect: &MergedProspect) -> Vec<FieldUpdate> {
    let mut fields = vec![
        FieldUpdate::new("full_name", prospect.full_name.clone()),
        FieldUpdate::new("title", prospect.current_title()),
        FieldUpdate::new("company", prospect.current_organization()),
    ];
    if let Some(profile_ref) = &prospect.profile_ref {
        fields.push(FieldUpdate::new("profile_url", profile_ref.clone()));
    }
    if let Some(location) = prospect.profile_data.as_ref().and_then(|p| p.location.clone()) {
        fields.push(FieldUpdate::new("location", location));
    }
    if let Some(score) = &prospect.score {
        fields.push(FieldUpdate::new("qualification_score", json!(score.score)));
        fields.push(FieldUpdate::new("qualification_rationale", score.rationale.clone()));
    }
    let sources: Vec<String> = prospect.sources_seen.iter().map(|s| s.to_string()).collect();
    fields.push(FieldUpdate::new("discovery_sources", json!(sources)));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_lead_fields_prefer_profile_values() {
        let prospect = MergedProspect {
            identity_key: "jane doe".into(),
            full_name: "Jane Doe".into(),
            title: "Finance".into(),
            organization: "Example".into(),
            profile_ref: Some("https://x/in/jane".into()),
            alternate_refs: vec![],
            profile_data: Some(ProfileData {
                full_name: "Jane Doe".into(),
                headline: Some("CFO".into()),
                current_company: Some("Example Health".into()),
                location: Some("Boston, MA".into()),
                ..Default::default()
            }),
            sources_seen: BTreeSet::from([Source::SourceA, Source::SourceB]),
            discovery_index: 0,
            enrichment: Some(EnrichmentStatus::Inline),
            validation: Some(Validation::pass()),
            score: Some(QualificationScore {
                score: 88.0,
                rationale: "Owns the budget".into(),
            }),
        };

        let fields = lead_field_updates(&prospect);
        let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "full_name",
                "title",
                "company",
                "profile_url",
                "location",
                "qualification_score",
                "qualification_rationale",
                "discovery_sources"
            ]
        );
        assert_eq!(fields[1].value, json!("CFO"));
        assert_eq!(fields[7].value, json!(["source_a", "source_b"]));
    }
}
