use crate::collaborators::{DiscoverySource, ProfileEnricher, ProspectScorer};
use crate::config::Config;
use crate::models::*;
use crate::resilience::UpstreamError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        })
}

/// Reads a non-success response body for error reporting.
async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}

// ============ Source A: web search ============

#[derive(Debug, Deserialize)]
struct SearchApiResponse {
    #[serde(default)]
    items: Vec<SearchHit>,
}

/// Web-search discovery backend (Source A). Returns profile references only.
pub struct SearchApiService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SearchApiService {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.source_a_base_url.clone(),
            config.source_a_api_key.clone(),
            config.upstream_timeout(),
        )
    }
}

/// Search expression restricted to public profile pages.
pub fn build_search_expression(query: &DiscoveryQuery) -> String {
    let mut expression = format!("site:linkedin.com/in \"{}\"", query.org_name.trim());
    let titles: Vec<String> = query
        .role_titles
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| format!("\"{}\"", t.trim()))
        .collect();
    if !titles.is_empty() {
        expression.push_str(&format!(" ({})", titles.join(" OR ")));
    }
    if let Some(region) = query.region.as_deref().filter(|r| !r.trim().is_empty()) {
        expression.push_str(&format!(" \"{}\"", region.trim()));
    }
    expression
}

#[async_trait]
impl DiscoverySource for SearchApiService {
    fn source(&self) -> Source {
        Source::SourceA
    }

    async fn search(&self, query: &DiscoveryQuery) -> Result<Vec<SourcePayload>, UpstreamError> {
        let expression = build_search_expression(query);

        // Build URL with proper parameter encoding
        let url = reqwest::Url::parse_with_params(
            &format!("{}/search", self.base_url),
            &[("key", self.api_key.as_str()), ("q", expression.as_str())],
        )
        .map_err(|e| UpstreamError::Fatal(format!("Failed to build search URL: {}", e)))?;

        tracing::info!("Searching source A for '{}'", query.org_name);
        tracing::debug!("Source A URL: {}/search?key=[REDACTED]&q={}", self.base_url, expression);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest("Source A", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body(response).await;
            return Err(UpstreamError::from_status("Source A", status, &body));
        }

        let parsed: SearchApiResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Fatal(format!("Malformed source A payload: {}", e)))?;

        tracing::info!("Source A returned {} hit(s)", parsed.items.len());
        Ok(parsed.items.into_iter().map(SourcePayload::SearchHit).collect())
    }
}

// ============ Source B: structured people search ============

#[derive(Debug, Deserialize)]
struct PeopleSearchResponse {
    #[serde(default)]
    people: Vec<ProfileRecord>,
}

/// Structured people-search backend (Source B). Returns inline profiles.
pub struct PeopleSearchService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PeopleSearchService {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.source_b_base_url.clone(),
            config.source_b_api_key.clone(),
            config.upstream_timeout(),
        )
    }
}

#[async_trait]
impl DiscoverySource for PeopleSearchService {
    fn source(&self) -> Source {
        Source::SourceB
    }

    async fn search(&self, query: &DiscoveryQuery) -> Result<Vec<SourcePayload>, UpstreamError> {
        let url = format!("{}/v1/people/search", self.base_url);
        tracing::info!("Searching source B for '{}'", query.org_name);

        let body = json!({
            "organization": query.org_name,
            "titles": query.role_titles,
            "location": query.region,
        });

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest("Source B", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body(response).await;
            return Err(UpstreamError::from_status("Source B", status, &body));
        }

        let parsed: PeopleSearchResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Fatal(format!("Malformed source B payload: {}", e)))?;

        tracing::info!("Source B returned {} profile(s)", parsed.people.len());
        Ok(parsed
            .people
            .into_iter()
            .map(SourcePayload::ProfileRecord)
            .collect())
    }
}

// ============ Enrichment ============

/// Profile lookup backend used by the enrichment gate.
pub struct ProfileApiService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ProfileApiService {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.enrichment_base_url.clone(),
            config.enrichment_api_key.clone(),
            config.upstream_timeout(),
        )
    }
}

fn str_field(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Maps a raw profile document into [`ProfileData`].
///
/// The current employer is the first experience without an end date; the
/// location falls back to `city, state` when no preformatted location exists.
pub fn profile_from_json(data: &Value) -> Option<ProfileData> {
    let full_name = str_field(data, "full_name").or_else(|| {
        match (str_field(data, "first_name"), str_field(data, "last_name")) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first),
            _ => None,
        }
    })?;

    let current_experience = data
        .get("experiences")
        .and_then(|e| e.as_array())
        .and_then(|experiences| {
            experiences
                .iter()
                .find(|exp| exp.get("ends_at").map_or(true, Value::is_null))
        });

    let headline = current_experience
        .and_then(|exp| str_field(exp, "title"))
        .or_else(|| str_field(data, "occupation"))
        .or_else(|| str_field(data, "headline"));

    let current_company = current_experience
        .and_then(|exp| str_field(exp, "company"))
        .or_else(|| str_field(data, "company"));

    let location = str_field(data, "location").or_else(|| {
        let parts: Vec<String> = ["city", "state"]
            .iter()
            .filter_map(|k| str_field(data, k))
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    });

    let connections = data
        .get("connections")
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .map(|c| c.min(u32::MAX as u64) as u32);

    Some(ProfileData {
        full_name,
        headline,
        current_company,
        summary: str_field(data, "summary"),
        location,
        connections,
        extra: data.clone(),
    })
}

#[async_trait]
impl ProfileEnricher for ProfileApiService {
    async fn fetch_profile(&self, profile_ref: &str) -> Result<Option<ProfileData>, UpstreamError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/v1/profile", self.base_url),
            &[("url", profile_ref)],
        )
        .map_err(|e| UpstreamError::Fatal(format!("Failed to build profile URL: {}", e)))?;

        tracing::debug!("Fetching profile {}", profile_ref);

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest("Enrichment API", e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::info!("Profile not found: {}", profile_ref);
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body(response).await;
            return Err(UpstreamError::from_status("Enrichment API", status, &body));
        }

        let data: Value = response.json().await.map_err(|e| {
            UpstreamError::Fatal(format!("Failed to parse enrichment response: {}", e))
        })?;

        match profile_from_json(&data) {
            Some(profile) => Ok(Some(profile)),
            None => Err(UpstreamError::Fatal(format!(
                "Enrichment response for {} has no name",
                profile_ref
            ))),
        }
    }
}

// ============ Scoring ============

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: f64,
    #[serde(default)]
    rationale: String,
}

/// AI qualification scoring backend.
pub struct ScoringService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ScoringService {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.scoring_base_url.clone(),
            config.scoring_api_key.clone(),
            config.upstream_timeout(),
        )
    }
}

#[async_trait]
impl ProspectScorer for ScoringService {
    async fn score(
        &self,
        profile: &ProfileData,
        target: &TargetContext,
    ) -> Result<QualificationScore, UpstreamError> {
        let url = format!("{}/v1/score", self.base_url);
        tracing::debug!("Scoring {} against {}", profile.full_name, target.organization);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({ "profile": profile, "target": target }))
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest("Scoring API", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body(response).await;
            return Err(UpstreamError::from_status("Scoring API", status, &body));
        }

        let parsed: ScoreResponse = response.json().await.map_err(|e| {
            UpstreamError::Fatal(format!("Failed to parse scoring response: {}", e))
        })?;

        Ok(QualificationScore {
            score: parsed.score,
            rationale: parsed.rationale,
        })
    }
}
