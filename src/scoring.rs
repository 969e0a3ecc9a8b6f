//! Qualification scoring for cascade survivors.
//!
//! Each prospect gets one scoring call; calls run with bounded concurrency and a
//! failure only affects its own prospect.

use crate::collaborators::ProspectScorer;
use crate::models::{FilterRule, MergedProspect, QualificationScore, TargetContext, Validation};
use crate::resilience::{UpstreamError, UpstreamGuard};
use futures::stream::{self, StreamExt};
use std::cmp::Ordering;
use std::sync::Arc;

pub struct QualificationScorer {
    scorer: Arc<dyn ProspectScorer>,
    guard: UpstreamGuard,
    concurrency: usize,
}

impl QualificationScorer {
    pub fn new(scorer: Arc<dyn ProspectScorer>, guard: UpstreamGuard, concurrency: usize) -> Self {
        Self {
            scorer,
            guard,
            concurrency: concurrency.max(1),
        }
    }

    /// Scores every prospect, returning `(scored, rejected)` in input order.
    pub async fn score_all(
        &self,
        prospects: Vec<MergedProspect>,
        target: &TargetContext,
    ) -> (Vec<MergedProspect>, Vec<MergedProspect>) {
        let results: Vec<(MergedProspect, Result<QualificationScore, String>)> =
            stream::iter(prospects)
                .map(|prospect| async move {
                    let result = self.score_one(&prospect, target).await;
                    (prospect, result)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut scored = Vec::with_capacity(results.len());
        let mut rejected = Vec::new();
        for (mut prospect, result) in results {
            match result {
                Ok(score) => {
                    tracing::debug!("Scored '{}' at {:.1}", prospect.full_name, score.score);
                    prospect.score = Some(score);
                    scored.push(prospect);
                }
                Err(reason) => {
                    tracing::warn!("Scoring failed for '{}': {}", prospect.full_name, reason);
                    prospect.validation = Some(Validation::reject(FilterRule::Scoring, reason));
                    rejected.push(prospect);
                }
            }
        }

        tracing::info!(
            "Scored {} prospect(s), {} failed",
            scored.len(),
            rejected.len()
        );
        (scored, rejected)
    }

    async fn score_one(
        &self,
        prospect: &MergedProspect,
        target: &TargetContext,
    ) -> Result<QualificationScore, String> {
        let Some(profile) = prospect.profile_data.as_ref() else {
            return Err("no profile data to score".to_string());
        };

        let score = self
            .guard
            .call(|| self.scorer.score(profile, target))
            .await
            .map_err(|e: UpstreamError| e.to_string())?;

        if !score.score.is_finite() || !(0.0..=100.0).contains(&score.score) {
            return Err(format!("score {} is outside 0..=100", score.score));
        }
        Ok(score)
    }
}

/// Orders scored prospects and applies the minimum score, then the result cap.
///
/// Sorting is by score descending with ties broken by discovery order. Returns
/// `(qualified, cut)`; cut prospects keep their score and carry the rule that
/// removed them.
pub fn rank_and_cut(
    mut scored: Vec<MergedProspect>,
    min_score: Option<f64>,
    max_results: Option<usize>,
) -> (Vec<MergedProspect>, Vec<MergedProspect>) {
    scored.sort_by(|a, b| {
        let score_a = a.score.as_ref().map_or(0.0, |s| s.score);
        let score_b = b.score.as_ref().map_or(0.0, |s| s.score);
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.discovery_index.cmp(&b.discovery_index))
    });

    let mut qualified = Vec::with_capacity(scored.len());
    let mut cut = Vec::new();

    for mut prospect in scored {
        let score = prospect.score.as_ref().map_or(0.0, |s| s.score);
        match min_score {
            Some(min) if score < min => {
                prospect.validation = Some(Validation::reject(
                    FilterRule::ScoreThreshold,
                    format!("score {:.1} is below the minimum of {:.1}", score, min),
                ));
                cut.push(prospect);
            }
            _ => qualified.push(prospect),
        }
    }

    if let Some(limit) = max_results {
        if qualified.len() > limit {
            for mut prospect in qualified.split_off(limit) {
                prospect.validation = Some(Validation::reject(
                    FilterRule::ResultLimit,
                    format!("beyond the top {} result(s)", limit),
                ));
                cut.push(prospect);
            }
        }
    }

    (qualified, cut)
}
