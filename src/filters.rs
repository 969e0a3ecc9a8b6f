//! Filter cascade applied to enriched prospects.
//!
//! Rules run in a fixed order and stop at the first failure, so every rejected
//! prospect carries exactly one rule and one reason.

use crate::config::PipelineConfig;
use crate::matcher::{contains_tokens, TargetOrganization};
use crate::models::{EnrichmentStatus, FilterRule, MergedProspect, Validation};
use crate::name_normalizer::NameNormalizer;
use regex::Regex;

/// What the cascade checks prospects against.
#[derive(Debug, Clone)]
pub struct FilterTarget {
    pub organization: TargetOrganization,
    /// Region to require; `None` disables the geographic rule.
    pub region: Option<String>,
}

pub struct FilterCascade {
    disqualifying_titles: Option<Regex>,
    qualifying_titles: Option<Regex>,
    past_employment: Option<Regex>,
    min_connections: u32,
    normalizer: NameNormalizer,
}

/// Case-insensitive alternation over literal terms. Word boundaries are only
/// asserted on ends that are word characters, so terms like `ex-` still match.
fn term_regex(terms: &[String]) -> Result<Option<Regex>, regex::Error> {
    let alternatives: Vec<String> = terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .map(|t| {
            let starts_word = t.chars().next().is_some_and(|c| c.is_alphanumeric());
            let ends_word = t.chars().last().is_some_and(|c| c.is_alphanumeric());
            format!(
                "{}{}{}",
                if starts_word { r"\b" } else { "" },
                regex::escape(&t),
                if ends_word { r"\b" } else { "" }
            )
        })
        .collect();

    if alternatives.is_empty() {
        return Ok(None);
    }
    Regex::new(&format!("(?i)(?:{})", alternatives.join("|"))).map(Some)
}

/// Lower-cased alphanumeric tokens joined by single spaces.
fn token_string(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_match(pattern: &Option<Regex>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

impl FilterCascade {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            disqualifying_titles: term_regex(&config.disqualifying_title_patterns)?,
            qualifying_titles: term_regex(&config.qualifying_title_patterns)?,
            past_employment: term_regex(&config.past_employment_markers)?,
            min_connections: config.min_connections,
            normalizer: config.normalizer.clone(),
        })
    }

    /// Runs every prospect through the cascade, returning `(passed, rejected)`.
    /// Relative order is preserved on both sides.
    pub fn apply(
        &self,
        prospects: Vec<MergedProspect>,
        target: &FilterTarget,
    ) -> (Vec<MergedProspect>, Vec<MergedProspect>) {
        let mut passed = Vec::new();
        let mut rejected = Vec::new();

        for mut prospect in prospects {
            let validation = self.evaluate(&prospect, target);
            if let (Some(rule), Some(reason)) = (validation.rule, validation.reason.as_deref()) {
                tracing::debug!("Rejected '{}' by {}: {}", prospect.full_name, rule, reason);
            }
            let ok = validation.passed;
            prospect.validation = Some(validation);
            if ok {
                passed.push(prospect);
            } else {
                rejected.push(prospect);
            }
        }

        tracing::info!(
            "Filter cascade: {} passed, {} rejected",
            passed.len(),
            rejected.len()
        );
        (passed, rejected)
    }

    pub fn evaluate(&self, prospect: &MergedProspect, target: &FilterTarget) -> Validation {
        match self.first_failure(prospect, target) {
            Ok(()) => Validation::pass(),
            Err((rule, reason)) => Validation::reject(rule, reason),
        }
    }

    fn first_failure(
        &self,
        prospect: &MergedProspect,
        target: &FilterTarget,
    ) -> Result<(), (FilterRule, String)> {
        self.check_enrichment(prospect)
            .map_err(|r| (FilterRule::Enrichment, r))?;
        self.check_role(prospect)
            .map_err(|r| (FilterRule::RoleRelevance, r))?;
        self.check_network(prospect)
            .map_err(|r| (FilterRule::NetworkSize, r))?;
        self.check_employment(prospect, &target.organization)
            .map_err(|r| (FilterRule::EmploymentCurrency, r))?;
        self.check_geography(prospect, target.region.as_deref())
            .map_err(|r| (FilterRule::Geography, r))
    }

    fn check_enrichment(&self, prospect: &MergedProspect) -> Result<(), String> {
        if let Some(EnrichmentStatus::Failed { reason }) = &prospect.enrichment {
            return Err(reason.clone());
        }
        if prospect.profile_data.is_none() {
            return Err("no profile data available".to_string());
        }
        Ok(())
    }

    fn check_role(&self, prospect: &MergedProspect) -> Result<(), String> {
        let title = prospect.current_title();
        if is_match(&self.disqualifying_titles, title) && !is_match(&self.qualifying_titles, title) {
            return Err(format!("title '{}' is not a buying role", title));
        }
        Ok(())
    }

    /// A missing connection count passes.
    fn check_network(&self, prospect: &MergedProspect) -> Result<(), String> {
        let connections = prospect.profile_data.as_ref().and_then(|p| p.connections);
        match connections {
            Some(count) if count < self.min_connections => Err(format!(
                "{} connections is below the minimum of {}",
                count, self.min_connections
            )),
            _ => Ok(()),
        }
    }

    fn check_employment(
        &self,
        prospect: &MergedProspect,
        organization: &TargetOrganization,
    ) -> Result<(), String> {
        let current_org = prospect.current_organization();
        if current_org.trim().is_empty() {
            return Err("current organization unknown".to_string());
        }
        if !organization.matches(current_org, &self.normalizer) {
            return Err(format!(
                "currently at '{}', not '{}'",
                current_org, organization.name
            ));
        }

        // The discovery text can say "Former ..." while the profile headline does not.
        let summary = prospect
            .profile_data
            .as_ref()
            .and_then(|p| p.summary.as_deref())
            .unwrap_or_default();
        let texts = [prospect.current_title(), prospect.title.as_str(), summary];
        if let Some(text) = texts.iter().find(|t| is_match(&self.past_employment, t)) {
            return Err(format!("'{}' describes a past role", text));
        }
        Ok(())
    }

    /// The region must appear as whole tokens ("CA" matches "San Diego, CA" but
    /// not "Chicago"). A missing location does not match.
    fn check_geography(&self, prospect: &MergedProspect, region: Option<&str>) -> Result<(), String> {
        let Some(region) = region.map(str::trim).filter(|r| !token_string(r).is_empty()) else {
            return Ok(());
        };
        let location = prospect
            .profile_data
            .as_ref()
            .and_then(|p| p.location.as_deref())
            .unwrap_or_default();
        if contains_tokens(&token_string(location), &token_string(region)) {
            Ok(())
        } else if location.trim().is_empty() {
            Err(format!("no location reported, region '{}' required", region))
        } else {
            Err(format!("location '{}' is outside '{}'", location, region))
        }
    }
}
