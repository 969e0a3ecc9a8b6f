//! Contracts for the external systems the pipeline depends on.
//!
//! HTTP implementations live in [`crate::services`] and [`crate::crm_client`];
//! tests substitute in-process fakes.

use crate::models::{
    DiscoveryQuery, FieldUpdate, ProfileData, QualificationScore, RecordType, Source,
    SourcePayload, TargetContext,
};
use crate::resilience::UpstreamError;
use async_trait::async_trait;

/// A people-discovery backend. Must be side-effect free; "no results" is an empty list.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    fn source(&self) -> Source;

    async fn search(&self, query: &DiscoveryQuery) -> Result<Vec<SourcePayload>, UpstreamError>;
}

/// Fetches a full profile by reference. `Ok(None)` means the profile does not exist.
#[async_trait]
pub trait ProfileEnricher: Send + Sync {
    async fn fetch_profile(&self, profile_ref: &str) -> Result<Option<ProfileData>, UpstreamError>;
}

/// Scores a profile against the target, 0..=100. Called concurrently.
#[async_trait]
pub trait ProspectScorer: Send + Sync {
    async fn score(
        &self,
        profile: &ProfileData,
        target: &TargetContext,
    ) -> Result<QualificationScore, UpstreamError>;
}

/// CRM record store.
#[async_trait]
pub trait CrmBackend: Send + Sync {
    /// Creates a record and returns its CRM id.
    async fn create_record(
        &self,
        record_type: RecordType,
        field_updates: &[FieldUpdate],
    ) -> Result<String, UpstreamError>;

    async fn update_record(
        &self,
        record_type: RecordType,
        record_id: &str,
        field_updates: &[FieldUpdate],
    ) -> Result<(), UpstreamError>;
}
