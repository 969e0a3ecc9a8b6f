/// Enrichment gate: makes sure every prospect carries profile data before filtering.
///
/// Prospects that arrived with an inline payload pass through untouched. The rest
/// are looked up by profile reference, one at a time, through the enrichment
/// collaborator. Found profiles are cached (checksum-validated) so repeated runs
/// against the same organization do not refetch them.
use crate::cache_validator::ValidatedCacheEntry;
use crate::collaborators::ProfileEnricher;
use crate::dedup::normalize_profile_ref;
use crate::models::{EnrichmentStatus, MergedProspect, ProfileData};
use crate::resilience::{UpstreamError, UpstreamGuard};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

const CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const CACHE_CAPACITY: u64 = 10_000;

pub struct EnrichmentGate {
    enricher: Arc<dyn ProfileEnricher>,
    guard: UpstreamGuard,
    cache: Cache<String, ValidatedCacheEntry>,
}

impl EnrichmentGate {
    pub fn new(enricher: Arc<dyn ProfileEnricher>, guard: UpstreamGuard) -> Self {
        Self::with_cache_settings(enricher, guard, CACHE_TTL, CACHE_CAPACITY)
    }

    pub fn with_cache_settings(
        enricher: Arc<dyn ProfileEnricher>,
        guard: UpstreamGuard,
        ttl: Duration,
        capacity: u64,
    ) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(capacity)
            .build();
        Self {
            enricher,
            guard,
            cache,
        }
    }

    /// Attaches profile data (or a failure reason) to every prospect.
    ///
    /// Order is preserved. Prospects are never dropped here; a failed lookup is
    /// recorded as [`EnrichmentStatus::Failed`] for the filter cascade to reject.
    pub async fn enrich(&self, prospects: Vec<MergedProspect>) -> Vec<MergedProspect> {
        let mut out = Vec::with_capacity(prospects.len());
        let (mut inline, mut enriched, mut failed) = (0usize, 0usize, 0usize);

        for mut prospect in prospects {
            if prospect.profile_data.is_some() {
                prospect.enrichment = Some(EnrichmentStatus::Inline);
                inline += 1;
                out.push(prospect);
                continue;
            }

            let status = match prospect.profile_ref.clone() {
                None => EnrichmentStatus::Failed {
                    reason: "no profile reference to enrich from".to_string(),
                },
                Some(profile_ref) => match self.lookup(&profile_ref).await {
                    Ok(Some(profile)) => {
                        prospect.profile_data = Some(profile);
                        EnrichmentStatus::Enriched
                    }
                    Ok(None) => EnrichmentStatus::Failed {
                        reason: format!("profile not found: {}", profile_ref),
                    },
                    Err(e) => {
                        tracing::warn!(
                            "Enrichment failed for '{}' ({}): {}",
                            prospect.full_name,
                            profile_ref,
                            e
                        );
                        EnrichmentStatus::Failed {
                            reason: format!("enrichment unavailable: {}", e),
                        }
                    }
                },
            };

            match status {
                EnrichmentStatus::Failed { .. } => failed += 1,
                _ => enriched += 1,
            }
            prospect.enrichment = Some(status);
            out.push(prospect);
        }

        tracing::info!(
            "Enrichment gate: {} inline, {} enriched, {} failed",
            inline,
            enriched,
            failed
        );
        out
    }

    async fn lookup(&self, profile_ref: &str) -> Result<Option<ProfileData>, UpstreamError> {
        let key = normalize_profile_ref(profile_ref);

        if let Some(entry) = self.cache.get(&key).await {
            match entry.open::<ProfileData>() {
                Some(profile) => {
                    tracing::debug!("Enrichment cache hit for {}", key);
                    return Ok(Some(profile));
                }
                None => self.cache.invalidate(&key).await,
            }
        }

        let enricher = self.enricher.clone();
        let fetched = self
            .guard
            .call(|| {
                let enricher = enricher.clone();
                let profile_ref = profile_ref.to_string();
                async move { enricher.fetch_profile(&profile_ref).await }
            })
            .await?;

        if let Some(profile) = &fetched {
            if let Some(entry) = ValidatedCacheEntry::seal(profile) {
                self.cache.insert(key, entry).await;
            }
        }
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use crate::resilience::RetryPolicy;
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeEnricher {
        profiles: HashMap<String, ProfileData>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProfileEnricher for FakeEnricher {
        async fn fetch_profile(
            &self,
            profile_ref: &str,
        ) -> Result<Option<ProfileData>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if profile_ref.contains("broken") {
                return Err(UpstreamError::Fatal("enrichment returned 400".into()));
            }
            Ok(self.profiles.get(profile_ref).cloned())
        }
    }

    fn prospect(name: &str, profile_ref: Option<&str>, data: Option<ProfileData>) -> MergedProspect {
        MergedProspect {
            identity_key: name.to_lowercase(),
            full_name: name.to_string(),
            title: "CFO".into(),
            organization: "Example Health".into(),
            profile_ref: profile_ref.map(str::to_string),
            alternate_refs: vec![],
            profile_data: data,
            sources_seen: BTreeSet::from([Source::SourceA]),
            discovery_index: 0,
            enrichment: None,
            validation: None,
            score: None,
        }
    }

    fn gate(profiles: HashMap<String, ProfileData>) -> (EnrichmentGate, Arc<FakeEnricher>) {
        let enricher = Arc::new(FakeEnricher {
            profiles,
            calls: AtomicUsize::new(0),
        });
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        let gate = EnrichmentGate::new(enricher.clone(), UpstreamGuard::new("enrichment", policy));
        (gate, enricher)
    }

    fn jane() -> ProfileData {
        ProfileData {
            full_name: "Jane Doe".into(),
            headline: Some("CFO".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_outcomes_per_prospect() {
        let (gate, enricher) = gate(HashMap::from([("https://x/in/jane".to_string(), jane())]));

        let out = gate
            .enrich(vec![
                prospect("Inline Person", None, Some(jane())),
                prospect("Jane Doe", Some("https://x/in/jane"), None),
                prospect("No Ref", None, None),
                prospect("Ghost", Some("https://x/in/ghost"), None),
                prospect("Broken", Some("https://x/in/broken"), None),
            ])
            .await;

        assert_eq!(out.len(), 5);
        assert_eq!(out[0].enrichment, Some(EnrichmentStatus::Inline));
        assert_eq!(out[1].enrichment, Some(EnrichmentStatus::Enriched));
        assert_eq!(out[1].profile_data, Some(jane()));
        for failed in &out[2..] {
            assert!(matches!(failed.enrichment, Some(EnrichmentStatus::Failed { .. })));
            assert!(failed.profile_data.is_none());
        }
        // Inline and reference-less prospects never reach the collaborator.
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_found_profiles_are_cached() {
        let (gate, enricher) = gate(HashMap::from([("https://x/in/jane".to_string(), jane())]));

        gate.enrich(vec![prospect("Jane Doe", Some("https://x/in/jane"), None)])
            .await;
        let again = gate
            .enrich(vec![prospect("Jane Doe", Some("https://x/in/jane/"), None)])
            .await;

        assert_eq!(again[0].enrichment, Some(EnrichmentStatus::Enriched));
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
    }
}
