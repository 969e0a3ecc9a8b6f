use crate::name_normalizer::NameNormalizer;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Option<String>, // None falls back to the in-memory queue store
    pub port: u16,
    pub source_a_base_url: String,
    pub source_a_api_key: String,
    pub source_b_base_url: String,
    pub source_b_api_key: String,
    pub enrichment_base_url: String,
    pub enrichment_api_key: String,
    pub scoring_base_url: String,
    pub scoring_api_key: String,
    pub crm_base_url: String,
    pub crm_token: String,
    pub reviewer_token: Option<String>,
    pub upstream_timeout_secs: u64,
    pub upstream_max_attempts: u32,
    pub min_connections: u32,
    pub scoring_concurrency: usize,
}

fn required_url(name: &str) -> anyhow::Result<String> {
    let url = std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))?;
    if url.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    url::Url::parse(&url).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    Ok(url.trim_end_matches('/').to_string())
}

fn required_secret(name: &str) -> anyhow::Result<String> {
    let value = std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    Ok(value)
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", name)),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => {
                if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                    anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                }
                Some(url)
            }
            _ => None,
        };

        let config = Self {
            database_url,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            source_a_base_url: required_url("SOURCE_A_BASE_URL")?,
            source_a_api_key: required_secret("SOURCE_A_API_KEY")?,
            source_b_base_url: required_url("SOURCE_B_BASE_URL")?,
            source_b_api_key: required_secret("SOURCE_B_API_KEY")?,
            enrichment_base_url: required_url("ENRICHMENT_BASE_URL")?,
            enrichment_api_key: required_secret("ENRICHMENT_API_KEY")?,
            scoring_base_url: required_url("SCORING_BASE_URL")?,
            scoring_api_key: required_secret("SCORING_API_KEY")?,
            crm_base_url: required_url("CRM_BASE_URL")?,
            crm_token: required_secret("CRM_TOKEN")?,
            reviewer_token: std::env::var("REVIEWER_TOKEN")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            upstream_timeout_secs: parsed_or("UPSTREAM_TIMEOUT_SECS", 20)?,
            upstream_max_attempts: parsed_or("UPSTREAM_MAX_ATTEMPTS", 3)?,
            min_connections: parsed_or("MIN_CONNECTIONS", 50)?,
            scoring_concurrency: parsed_or("SCORING_CONCURRENCY", 8)?,
        };

        if config.upstream_max_attempts == 0 {
            anyhow::bail!("UPSTREAM_MAX_ATTEMPTS must be at least 1");
        }

        // Only non-secret values are logged
        tracing::info!("Configuration loaded successfully");
        if let Some(ref url) = config.database_url {
            tracing::debug!("Database URL: {}...", &url[..20.min(url.len())]);
        } else {
            tracing::warn!("DATABASE_URL not set, approval queue will not survive restarts");
        }
        tracing::debug!("Source A URL: {}", config.source_a_base_url);
        tracing::debug!("Source B URL: {}", config.source_b_base_url);
        tracing::debug!("Enrichment URL: {}", config.enrichment_base_url);
        tracing::debug!("Scoring URL: {}", config.scoring_base_url);
        tracing::debug!("CRM URL: {}", config.crm_base_url);
        if config.reviewer_token.is_none() {
            tracing::warn!("REVIEWER_TOKEN not set, queue mutations are unauthenticated");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Pipeline tunables seeded from the environment-backed values.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            min_connections: self.min_connections,
            scoring_concurrency: self.scoring_concurrency.max(1),
            ..PipelineConfig::default()
        }
    }
}

/// Tunables for a single pipeline run.
///
/// Passed explicitly into [`crate::pipeline::ProspectPipeline`] so two runs with the same
/// inputs and configuration behave identically.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Role titles searched for when a request does not name any.
    pub default_role_titles: Vec<String>,
    /// Title fragments that mark a non-buyer (intern, student, ...).
    pub disqualifying_title_patterns: Vec<String>,
    /// Seniority fragments that override a disqualifying match.
    pub qualifying_title_patterns: Vec<String>,
    /// Phrases in a title or summary that indicate a past role.
    pub past_employment_markers: Vec<String>,
    pub min_connections: u32,
    pub scoring_concurrency: usize,
    /// Upper bound on qualified prospects when the request gives none.
    pub default_max_results: Option<usize>,
    /// Provenance tag written to every queued proposal.
    pub enrichment_type: String,
    pub normalizer: NameNormalizer,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_role_titles: strings(&[
                "Chief Financial Officer",
                "Chief Operating Officer",
                "VP of Facilities",
                "Director of Facilities",
                "Director of Procurement",
            ]),
            disqualifying_title_patterns: strings(&[
                "intern",
                "internship",
                "student",
                "trainee",
                "apprentice",
                "volunteer",
                "extern",
            ]),
            qualifying_title_patterns: strings(&[
                "chief",
                "ceo",
                "cfo",
                "coo",
                "cio",
                "cto",
                "president",
                "vice president",
                "vp",
                "svp",
                "evp",
                "director",
                "head",
                "manager",
                "administrator",
                "owner",
                "founder",
                "partner",
            ]),
            past_employment_markers: strings(&[
                "former",
                "formerly",
                "previously",
                "ex-",
                "retired",
            ]),
            min_connections: 50,
            scoring_concurrency: 8,
            default_max_results: None,
            enrichment_type: "prospect_discovery".to_string(),
            normalizer: NameNormalizer::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_url_trims_trailing_slash() {
        std::env::set_var("TEST_CFG_CRM_URL", "https://crm.example.com/");
        assert_eq!(
            required_url("TEST_CFG_CRM_URL").unwrap(),
            "https://crm.example.com"
        );
    }

    #[test]
    fn test_required_url_rejects_other_schemes() {
        std::env::set_var("TEST_CFG_BAD_URL", "ftp://crm.example.com");
        assert!(required_url("TEST_CFG_BAD_URL").is_err());
        assert!(required_url("TEST_CFG_UNSET_URL").is_err());
    }

    #[test]
    fn test_parsed_or_falls_back_and_validates() {
        assert_eq!(parsed_or("TEST_CFG_UNSET_NUMBER", 50u32).unwrap(), 50);
        std::env::set_var("TEST_CFG_NUMBER", " 75 ");
        assert_eq!(parsed_or("TEST_CFG_NUMBER", 50u32).unwrap(), 75);
        std::env::set_var("TEST_CFG_NOT_A_NUMBER", "many");
        assert!(parsed_or("TEST_CFG_NOT_A_NUMBER", 50u32).is_err());
    }
}
