use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============ Discovery Models ============

/// Which discovery backend produced a candidate.
///
/// Ordering matters: `SourceA` sorts before `SourceB`, which is the tie-break
/// order for prospects with equal scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    SourceA,
    SourceB,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::SourceA => write!(f, "source_a"),
            Source::SourceB => write!(f, "source_b"),
        }
    }
}

/// Full profile payload for one person.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    pub full_name: String,
    /// Current job title / headline.
    pub headline: Option<String>,
    pub current_company: Option<String>,
    pub summary: Option<String>,
    pub location: Option<String>,
    pub connections: Option<u32>,
    /// Everything else the backend returned, kept as scoring context.
    #[serde(default)]
    pub extra: Value,
}

/// A reference-only search result (Source A).
///
/// `title` is the page title, typically `"Name - Title - Company | Site"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// A structured people-search record (Source B).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub full_name: String,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub connections: Option<u32>,
}

/// Native result shapes, one variant per discovery backend.
///
/// Converted into [`Candidate`] at the aggregator boundary; nothing downstream
/// branches on the source shape again.
#[derive(Debug, Clone)]
pub enum SourcePayload {
    SearchHit(SearchHit),
    ProfileRecord(ProfileRecord),
}

/// Parameters sent to both discovery backends.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryQuery {
    pub org_name: String,
    pub role_titles: Vec<String>,
    pub region: Option<String>,
}

/// Lower-cased, whitespace-collapsed full name used as the dedup join key.
pub fn identity_key(full_name: &str) -> String {
    full_name
        .split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A provisional prospect as produced by the aggregator.
///
/// Fields are read-only after construction; later stages build
/// [`MergedProspect`]s instead of editing candidates.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    identity_key: String,
    source: Source,
    full_name: String,
    organization_raw: String,
    title_raw: String,
    profile_ref: Option<String>,
    profile_data: Option<ProfileData>,
    discovery_rank: usize,
}

impl Candidate {
    pub fn new(
        source: Source,
        full_name: impl Into<String>,
        organization_raw: impl Into<String>,
        title_raw: impl Into<String>,
        profile_ref: Option<String>,
        profile_data: Option<ProfileData>,
        discovery_rank: usize,
    ) -> Self {
        let full_name = full_name.into();
        Self {
            identity_key: identity_key(&full_name),
            source,
            full_name: full_name.trim().to_string(),
            organization_raw: organization_raw.into(),
            title_raw: title_raw.into(),
            profile_ref: profile_ref.filter(|r| !r.trim().is_empty()),
            profile_data,
            discovery_rank,
        }
    }

    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn organization_raw(&self) -> &str {
        &self.organization_raw
    }

    pub fn title_raw(&self) -> &str {
        &self.title_raw
    }

    pub fn profile_ref(&self) -> Option<&str> {
        self.profile_ref.as_deref()
    }

    pub fn profile_data(&self) -> Option<&ProfileData> {
        self.profile_data.as_ref()
    }

    pub fn discovery_rank(&self) -> usize {
        self.discovery_rank
    }
}

// ============ Qualification Models ============

/// How a prospect came to carry (or lack) profile data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichmentStatus {
    /// Profile data arrived with the discovery result.
    Inline,
    /// Profile data was fetched by the enrichment gate.
    Enriched,
    /// No profile data could be obtained.
    Failed { reason: String },
}

/// The rule that decided a prospect's fate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterRule {
    Enrichment,
    RoleRelevance,
    NetworkSize,
    EmploymentCurrency,
    Geography,
    Scoring,
    ScoreThreshold,
    ResultLimit,
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterRule::Enrichment => "enrichment",
            FilterRule::RoleRelevance => "role_relevance",
            FilterRule::NetworkSize => "network_size",
            FilterRule::EmploymentCurrency => "employment_currency",
            FilterRule::Geography => "geography",
            FilterRule::Scoring => "scoring",
            FilterRule::ScoreThreshold => "score_threshold",
            FilterRule::ResultLimit => "result_limit",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of the filter cascade (and of later post-scoring cuts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub passed: bool,
    pub rule: Option<FilterRule>,
    pub reason: Option<String>,
}

impl Validation {
    pub fn pass() -> Self {
        Self {
            passed: true,
            rule: None,
            reason: None,
        }
    }

    pub fn reject(rule: FilterRule, reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            rule: Some(rule),
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualificationScore {
    pub score: f64,
    pub rationale: String,
}

/// Context handed to the scoring backend alongside a profile.
#[derive(Debug, Clone, Serialize)]
pub struct TargetContext {
    pub organization: String,
    pub region: Option<String>,
    pub role_titles: Vec<String>,
}

/// One physical person after deduplication.
#[derive(Debug, Clone, Serialize)]
pub struct MergedProspect {
    pub identity_key: String,
    pub full_name: String,
    pub title: String,
    pub organization: String,
    pub profile_ref: Option<String>,
    /// Other references observed for the same person.
    pub alternate_refs: Vec<String>,
    pub profile_data: Option<ProfileData>,
    pub sources_seen: BTreeSet<Source>,
    /// Position in deduplicated output; A-derived prospects come first.
    pub discovery_index: usize,
    pub enrichment: Option<EnrichmentStatus>,
    pub validation: Option<Validation>,
    pub score: Option<QualificationScore>,
}

impl MergedProspect {
    /// Current title, preferring the profile payload over the raw discovery text.
    pub fn current_title(&self) -> &str {
        self.profile_data
            .as_ref()
            .and_then(|p| p.headline.as_deref())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.title)
    }

    /// Current employer, preferring the profile payload over the raw discovery text.
    pub fn current_organization(&self) -> &str {
        self.profile_data
            .as_ref()
            .and_then(|p| p.current_company.as_deref())
            .filter(|o| !o.trim().is_empty())
            .unwrap_or(&self.organization)
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.validation.as_ref().and_then(|v| v.reason.as_deref())
    }
}

// ============ Pipeline API Models ============

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineRequest {
    pub target_org: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub role_titles: Option<Vec<String>>,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Geographic rule toggle; defaults to on whenever a region is given.
    #[serde(default)]
    pub filter_by_region: Option<bool>,
}

/// Non-fatal degradation noted during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineWarning {
    pub stage: String,
    pub source: Option<Source>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    /// Correlates log lines and queued entries of one run.
    pub run_id: Uuid,
    pub target_org: String,
    pub qualified: Vec<MergedProspect>,
    pub rejected: Vec<MergedProspect>,
    pub queue_ids: Vec<i64>,
    pub warnings: Vec<PipelineWarning>,
}

// ============ Approval Queue Models ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Account,
    Contact,
    Lead,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Account => "account",
            RecordType::Contact => "contact",
            RecordType::Lead => "lead",
        }
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "account" => Ok(RecordType::Account),
            "contact" => Ok(RecordType::Contact),
            "lead" => Ok(RecordType::Lead),
            other => Err(format!("unknown record type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Pending,
    Approved,
    Rejected,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Pending => "pending",
            UpdateStatus::Approved => "approved",
            UpdateStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, UpdateStatus::Pending)
    }
}

impl FromStr for UpdateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UpdateStatus::Pending),
            "approved" => Ok(UpdateStatus::Approved),
            "rejected" => Ok(UpdateStatus::Rejected),
            other => Err(format!("unknown update status '{}'", other)),
        }
    }
}

/// One proposed field change, kept in proposal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub field: String,
    pub value: Value,
}

impl FieldUpdate {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A queued, human-reviewable CRM write-back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingUpdate {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: UpdateStatus,
    pub record_type: RecordType,
    /// CRM id; absent for Leads that have not been created yet.
    pub record_id: Option<String>,
    pub field_updates: Vec<FieldUpdate>,
    pub enrichment_type: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Insert payload for the approval queue.
#[derive(Debug, Clone)]
pub struct NewPendingUpdate {
    pub record_type: RecordType,
    pub record_id: Option<String>,
    pub field_updates: Vec<FieldUpdate>,
    pub enrichment_type: String,
}

/// Row shape of the `pending_updates` table.
#[derive(Debug, FromRow)]
pub struct PendingUpdateRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: String,
    pub record_type: String,
    pub record_id: Option<String>,
    pub field_updates: Json<Vec<FieldUpdate>>,
    pub enrichment_type: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl TryFrom<PendingUpdateRow> for PendingUpdate {
    type Error = String;

    fn try_from(row: PendingUpdateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            status: row.status.parse()?,
            record_type: row.record_type.parse()?,
            record_id: row.record_id,
            field_updates: row.field_updates.0,
            enrichment_type: row.enrichment_type,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            last_error: row.last_error,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkApprovalFailure {
    pub id: i64,
    pub error: String,
}

/// Result of `approve_all_pending`: every entry is reported on exactly one side.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkApprovalReport {
    pub approved: Vec<PendingUpdate>,
    pub failed: Vec<BulkApprovalFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_collapses_case_and_whitespace() {
        assert_eq!(identity_key("  Jane   DOE "), "jane doe");
        assert_eq!(identity_key("Jane Doe"), identity_key("jane doe"));
    }

    #[test]
    fn test_candidate_drops_blank_profile_ref() {
        let candidate = Candidate::new(Source::SourceA, "Jane Doe", "Org", "CFO", Some("  ".into()), None, 0);
        assert!(candidate.profile_ref().is_none());
        assert_eq!(candidate.identity_key(), "jane doe");
    }

    #[test]
    fn test_record_type_round_trip() {
        for record_type in [RecordType::Account, RecordType::Contact, RecordType::Lead] {
            assert_eq!(record_type.as_str().parse::<RecordType>().unwrap(), record_type);
        }
        assert!("opportunity".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_only_pending_is_non_terminal() {
        assert!(!UpdateStatus::Pending.is_terminal());
        assert!(UpdateStatus::Approved.is_terminal());
        assert!(UpdateStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_source_ordering_puts_a_first() {
        assert!(Source::SourceA < Source::SourceB);
    }

    #[test]
    fn test_current_title_prefers_profile() {
        let prospect = MergedProspect {
            identity_key: "jane doe".into(),
            full_name: "Jane Doe".into(),
            title: "Director".into(),
            organization: "Example".into(),
            profile_ref: None,
            alternate_refs: vec![],
            profile_data: Some(ProfileData {
                full_name: "Jane Doe".into(),
                headline: Some("CFO".into()),
                ..Default::default()
            }),
            sources_seen: BTreeSet::from([Source::SourceB]),
            discovery_index: 0,
            enrichment: None,
            validation: None,
            score: None,
        };
        assert_eq!(prospect.current_title(), "CFO");
        assert_eq!(prospect.current_organization(), "Example");
    }
}
