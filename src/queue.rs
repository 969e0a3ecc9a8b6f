//! Human approval queue for proposed CRM write-backs.
//!
//! Entries move `pending -> approved` or `pending -> rejected`; both are
//! terminal. An approval first takes an in-flight claim on a pending entry,
//! performs the CRM write, and only then flips the status. While the claim is
//! held every other approve or reject of the entry is a conflict, so only one
//! reviewer's approval ever reaches the CRM and a failed write leaves the
//! entry pending without it ever having been reported as approved.

use crate::collaborators::CrmBackend;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    BulkApprovalFailure, BulkApprovalReport, NewPendingUpdate, PendingUpdate, PendingUpdateRow,
    RecordType, UpdateStatus,
};
use crate::resilience::UpstreamGuard;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// An approval claim older than this is treated as abandoned (the process
/// holding it died mid-write) and may be taken over.
pub const APPROVAL_CLAIM_TTL_SECS: i64 = 300;

/// In-flight approval of one pending entry.
#[derive(Debug, Clone)]
pub struct ApprovalClaim {
    pub token: Uuid,
    pub entry: PendingUpdate,
}

/// Durable storage behind the approval queue.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn insert(&self, update: NewPendingUpdate) -> Result<PendingUpdate, AppError>;

    async fn get(&self, id: i64) -> Result<Option<PendingUpdate>, AppError>;

    /// Pending entries in insertion order, optionally restricted to one record type.
    async fn list_pending(
        &self,
        record_type: Option<RecordType>,
    ) -> Result<Vec<PendingUpdate>, AppError>;

    /// Takes the approval claim on a pending entry. The status stays `pending`.
    ///
    /// Returns `None` when the entry is missing, no longer pending, or already
    /// claimed; exactly one of several concurrent callers gets `Some`.
    async fn begin_approval(&self, id: i64) -> Result<Option<ApprovalClaim>, AppError>;

    /// Marks a claimed entry approved, recording `record_id` when the CRM
    /// created one. Returns `None` if the claim was lost.
    async fn complete_approval(
        &self,
        claim: &ApprovalClaim,
        reviewer: &str,
        record_id: Option<&str>,
    ) -> Result<Option<PendingUpdate>, AppError>;

    /// Drops the claim after a failed CRM write and records the error.
    async fn abandon_approval(&self, claim: &ApprovalClaim, error: &str) -> Result<(), AppError>;

    /// Moves an unclaimed pending entry to `rejected`.
    async fn reject(&self, id: i64, reviewer: &str) -> Result<Option<PendingUpdate>, AppError>;
}

// ============ Postgres store ============

pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn from_row(row: PendingUpdateRow) -> Result<PendingUpdate, AppError> {
    PendingUpdate::try_from(row)
        .map_err(|e| AppError::InternalError(format!("Corrupt pending_updates row: {}", e)))
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn insert(&self, update: NewPendingUpdate) -> Result<PendingUpdate, AppError> {
        let row = sqlx::query_as::<_, PendingUpdateRow>(
            r#"
            INSERT INTO pending_updates (record_type, record_id, field_updates, enrichment_type)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(update.record_type.as_str())
        .bind(&update.record_id)
        .bind(Json(&update.field_updates))
        .bind(&update.enrichment_type)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        from_row(row)
    }

    async fn get(&self, id: i64) -> Result<Option<PendingUpdate>, AppError> {
        let row = sqlx::query_as::<_, PendingUpdateRow>("SELECT * FROM pending_updates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        row.map(from_row).transpose()
    }

    async fn list_pending(
        &self,
        record_type: Option<RecordType>,
    ) -> Result<Vec<PendingUpdate>, AppError> {
        let rows = sqlx::query_as::<_, PendingUpdateRow>(
            r#"
            SELECT * FROM pending_updates
            WHERE status = 'pending'
              AND ($1::text IS NULL OR record_type = $1)
            ORDER BY id
            "#,
        )
        .bind(record_type.map(|r| r.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        rows.into_iter().map(from_row).collect()
    }

    async fn begin_approval(&self, id: i64) -> Result<Option<ApprovalClaim>, AppError> {
        let token = Uuid::new_v4();
        let row = sqlx::query_as::<_, PendingUpdateRow>(
            r#"
            UPDATE pending_updates
            SET approval_claim = $2,
                approval_claimed_at = now()
            WHERE id = $1
              AND status = 'pending'
              AND (approval_claim IS NULL
                   OR approval_claimed_at < now() - make_interval(secs => $3))
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(APPROVAL_CLAIM_TTL_SECS as f64)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        row.map(|row| from_row(row).map(|entry| ApprovalClaim { token, entry }))
            .transpose()
    }

    async fn complete_approval(
        &self,
        claim: &ApprovalClaim,
        reviewer: &str,
        record_id: Option<&str>,
    ) -> Result<Option<PendingUpdate>, AppError> {
        let row = sqlx::query_as::<_, PendingUpdateRow>(
            r#"
            UPDATE pending_updates
            SET status = 'approved',
                updated_at = now(),
                approved_by = $3,
                approved_at = now(),
                reviewed_by = $3,
                reviewed_at = now(),
                record_id = COALESCE($4, record_id),
                last_error = NULL,
                approval_claim = NULL,
                approval_claimed_at = NULL
            WHERE id = $1 AND status = 'pending' AND approval_claim = $2
            RETURNING *
            "#,
        )
        .bind(claim.entry.id)
        .bind(claim.token)
        .bind(reviewer)
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        row.map(from_row).transpose()
    }

    async fn abandon_approval(&self, claim: &ApprovalClaim, error: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE pending_updates
            SET approval_claim = NULL,
                approval_claimed_at = NULL,
                last_error = $3,
                updated_at = now()
            WHERE id = $1 AND approval_claim = $2
            "#,
        )
        .bind(claim.entry.id)
        .bind(claim.token)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    async fn reject(&self, id: i64, reviewer: &str) -> Result<Option<PendingUpdate>, AppError> {
        let row = sqlx::query_as::<_, PendingUpdateRow>(
            r#"
            UPDATE pending_updates
            SET status = 'rejected',
                updated_at = now(),
                reviewed_by = $2,
                reviewed_at = now(),
                approval_claim = NULL,
                approval_claimed_at = NULL
            WHERE id = $1
              AND status = 'pending'
              AND (approval_claim IS NULL
                   OR approval_claimed_at < now() - make_interval(secs => $3))
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reviewer)
        .bind(APPROVAL_CLAIM_TTL_SECS as f64)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        row.map(from_row).transpose()
    }
}

// ============ In-memory store ============

#[derive(Default)]
struct MemoryEntries {
    next_id: i64,
    entries: BTreeMap<i64, PendingUpdate>,
    claims: HashMap<i64, (Uuid, DateTime<Utc>)>,
}

impl MemoryEntries {
    /// Pending and not held by a live approval claim.
    fn available(&self, id: i64) -> bool {
        let pending = self
            .entries
            .get(&id)
            .map_or(false, |e| e.status == UpdateStatus::Pending);
        let claimed = self.claims.get(&id).map_or(false, |(_, at)| {
            Utc::now() - *at < chrono::Duration::seconds(APPROVAL_CLAIM_TTL_SECS)
        });
        pending && !claimed
    }

    fn holds_claim(&self, claim: &ApprovalClaim) -> bool {
        self.claims
            .get(&claim.entry.id)
            .map_or(false, |(token, _)| *token == claim.token)
    }
}

/// Process-local store used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryQueueStore {
    inner: Mutex<MemoryEntries>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert(&self, update: NewPendingUpdate) -> Result<PendingUpdate, AppError> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let now = Utc::now();
        let entry = PendingUpdate {
            id: inner.next_id,
            created_at: now,
            updated_at: now,
            status: UpdateStatus::Pending,
            record_type: update.record_type,
            record_id: update.record_id,
            field_updates: update.field_updates,
            enrichment_type: update.enrichment_type,
            approved_by: None,
            approved_at: None,
            reviewed_by: None,
            reviewed_at: None,
            last_error: None,
        };
        inner.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get(&self, id: i64) -> Result<Option<PendingUpdate>, AppError> {
        Ok(self.inner.lock().await.entries.get(&id).cloned())
    }

    async fn list_pending(
        &self,
        record_type: Option<RecordType>,
    ) -> Result<Vec<PendingUpdate>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .values()
            .filter(|e| e.status == UpdateStatus::Pending)
            .filter(|e| record_type.map_or(true, |rt| e.record_type == rt))
            .cloned()
            .collect())
    }

    async fn begin_approval(&self, id: i64) -> Result<Option<ApprovalClaim>, AppError> {
        let mut inner = self.inner.lock().await;
        if !inner.available(id) {
            return Ok(None);
        }
        let Some(entry) = inner.entries.get(&id).cloned() else {
            return Ok(None);
        };
        let token = Uuid::new_v4();
        inner.claims.insert(id, (token, Utc::now()));
        Ok(Some(ApprovalClaim { token, entry }))
    }

    async fn complete_approval(
        &self,
        claim: &ApprovalClaim,
        reviewer: &str,
        record_id: Option<&str>,
    ) -> Result<Option<PendingUpdate>, AppError> {
        let mut inner = self.inner.lock().await;
        if !inner.holds_claim(claim) {
            return Ok(None);
        }
        inner.claims.remove(&claim.entry.id);
        let Some(entry) = inner.entries.get_mut(&claim.entry.id) else {
            return Ok(None);
        };
        if entry.status != UpdateStatus::Pending {
            return Ok(None);
        }

        let now = Utc::now();
        entry.status = UpdateStatus::Approved;
        entry.updated_at = now;
        entry.approved_by = Some(reviewer.to_string());
        entry.approved_at = Some(now);
        entry.reviewed_by = Some(reviewer.to_string());
        entry.reviewed_at = Some(now);
        entry.last_error = None;
        if let Some(record_id) = record_id {
            entry.record_id = Some(record_id.to_string());
        }
        Ok(Some(entry.clone()))
    }

    async fn abandon_approval(&self, claim: &ApprovalClaim, error: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        if !inner.holds_claim(claim) {
            return Ok(());
        }
        inner.claims.remove(&claim.entry.id);
        if let Some(entry) = inner.entries.get_mut(&claim.entry.id) {
            entry.last_error = Some(error.to_string());
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reject(&self, id: i64, reviewer: &str) -> Result<Option<PendingUpdate>, AppError> {
        let mut inner = self.inner.lock().await;
        if !inner.available(id) {
            return Ok(None);
        }
        inner.claims.remove(&id);
        let Some(entry) = inner.entries.get_mut(&id) else {
            return Ok(None);
        };

        let now = Utc::now();
        entry.status = UpdateStatus::Rejected;
        entry.updated_at = now;
        entry.reviewed_by = Some(reviewer.to_string());
        entry.reviewed_at = Some(now);
        Ok(Some(entry.clone()))
    }
}

// ============ Queue operations ============

pub struct ApprovalQueue {
    store: Arc<dyn QueueStore>,
    crm: Arc<dyn CrmBackend>,
    guard: UpstreamGuard,
}

impl ApprovalQueue {
    pub fn new(store: Arc<dyn QueueStore>, crm: Arc<dyn CrmBackend>, guard: UpstreamGuard) -> Self {
        Self { store, crm, guard }
    }

    pub async fn enqueue(&self, update: NewPendingUpdate) -> Result<PendingUpdate, AppError> {
        let entry = self.store.insert(update).await?;
        tracing::info!(
            "Queued {} update {} ({} field(s))",
            entry.record_type.as_str(),
            entry.id,
            entry.field_updates.len()
        );
        Ok(entry)
    }

    pub async fn list_pending(
        &self,
        record_type: Option<RecordType>,
    ) -> Result<Vec<PendingUpdate>, AppError> {
        self.store.list_pending(record_type).await
    }

    pub async fn get(&self, id: i64) -> Result<PendingUpdate, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("pending update {}", id)))
    }

    /// Approves a pending entry and performs its single CRM write.
    ///
    /// A Lead without a record id is created; everything else is updated in
    /// place. The entry only becomes `approved` once the write succeeds. If it
    /// fails the entry stays pending with the error recorded, and the error is
    /// returned.
    pub async fn approve(&self, id: i64, reviewer: &str) -> Result<PendingUpdate, AppError> {
        let current = self.get(id).await?;
        if current.status.is_terminal() {
            return Err(already_reviewed(&current));
        }
        if current.record_type != RecordType::Lead && current.record_id.is_none() {
            return Err(AppError::BadRequest(format!(
                "{} update {} has no record id to update",
                current.record_type.as_str(),
                id
            )));
        }

        let claim = match self.store.begin_approval(id).await? {
            Some(claim) => claim,
            None => return Err(self.conflict_for(id).await),
        };

        let created_id = match self.write_to_crm(&claim.entry).await {
            Ok(created_id) => created_id,
            Err(e) => {
                tracing::error!("CRM write for update {} failed, leaving it pending: {}", id, e);
                self.store
                    .abandon_approval(&claim, &e.to_string())
                    .await
                    .context(format!("releasing approval claim on update {}", id))?;
                return Err(e);
            }
        };

        let approved = self
            .store
            .complete_approval(&claim, reviewer, created_id.as_deref())
            .await
            .with_context(|| format!("recording approval of update {}", id))?
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "approval claim on update {} expired before the CRM write was recorded",
                    id
                ))
            })?;

        match created_id {
            Some(created_id) => tracing::info!(
                "Approved update {} by {}: created {} {}",
                id,
                reviewer,
                approved.record_type.as_str(),
                created_id
            ),
            None => tracing::info!("Approved update {} by {}", id, reviewer),
        }
        Ok(approved)
    }

    /// Rejects a pending entry. Never touches the CRM.
    pub async fn reject(&self, id: i64, reviewer: &str) -> Result<PendingUpdate, AppError> {
        let current = self.get(id).await?;
        if current.status.is_terminal() {
            return Err(already_reviewed(&current));
        }
        match self.store.reject(id, reviewer).await? {
            Some(entry) => {
                tracing::info!("Rejected update {} by {}", id, reviewer);
                Ok(entry)
            }
            None => Err(self.conflict_for(id).await),
        }
    }

    /// Approves every pending entry independently; one failure does not stop the rest.
    pub async fn approve_all_pending(&self, reviewer: &str) -> Result<BulkApprovalReport, AppError> {
        let pending = self.store.list_pending(None).await?;
        let mut report = BulkApprovalReport::default();

        for entry in pending {
            match self.approve(entry.id, reviewer).await {
                Ok(approved) => report.approved.push(approved),
                Err(e) => report.failed.push(BulkApprovalFailure {
                    id: entry.id,
                    error: e.to_string(),
                }),
            }
        }

        tracing::info!(
            "Bulk approval: {} approved, {} failed",
            report.approved.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Returns the created record id for Lead creates.
    async fn write_to_crm(&self, entry: &PendingUpdate) -> Result<Option<String>, AppError> {
        let fields = entry.field_updates.as_slice();
        match (&entry.record_type, entry.record_id.as_deref()) {
            (RecordType::Lead, None) => {
                let created = self
                    .guard
                    .call(|| self.crm.create_record(RecordType::Lead, fields))
                    .await?;
                Ok(Some(created))
            }
            (record_type, Some(record_id)) => {
                self.guard
                    .call(|| self.crm.update_record(*record_type, record_id, fields))
                    .await?;
                Ok(None)
            }
            (record_type, None) => Err(AppError::BadRequest(format!(
                "{} update {} has no record id to update",
                record_type.as_str(),
                entry.id
            ))),
        }
    }

    async fn conflict_for(&self, id: i64) -> AppError {
        match self.store.get(id).await {
            Ok(Some(entry)) if entry.status == UpdateStatus::Pending => AppError::Conflict(format!(
                "pending update {} has an approval in progress",
                id
            )),
            Ok(Some(entry)) => already_reviewed(&entry),
            Ok(None) => AppError::NotFound(format!("pending update {}", id)),
            Err(e) => e,
        }
    }
}

fn already_reviewed(entry: &PendingUpdate) -> AppError {
    AppError::Conflict(format!(
        "pending update {} is already {}",
        entry.id,
        entry.status.as_str()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldUpdate;
    use crate::resilience::{RetryPolicy, UpstreamError};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct CountingCrm {
        creates: AtomicUsize,
        updates: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl CrmBackend for CountingCrm {
        async fn create_record(
            &self,
            _record_type: RecordType,
            _field_updates: &[FieldUpdate],
        ) -> Result<String, UpstreamError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(UpstreamError::Fatal("crm returned 422".into()));
            }
            let n = self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(format!("lead-{}", n + 1))
        }

        async fn update_record(
            &self,
            _record_type: RecordType,
            _record_id: &str,
            _field_updates: &[FieldUpdate],
        ) -> Result<(), UpstreamError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn queue(crm: Arc<CountingCrm>) -> ApprovalQueue {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        ApprovalQueue::new(
            Arc::new(MemoryQueueStore::new()),
            crm,
            UpstreamGuard::new("crm", policy),
        )
    }

    fn lead() -> NewPendingUpdate {
        NewPendingUpdate {
            record_type: RecordType::Lead,
            record_id: None,
            field_updates: vec![FieldUpdate::new("full_name", "Jane Doe")],
            enrichment_type: "prospect_discovery".into(),
        }
    }

    #[tokio::test]
    async fn test_approve_lead_creates_once() {
        let crm = Arc::new(CountingCrm::default());
        let queue = queue(crm.clone());
        let entry = queue.enqueue(lead()).await.unwrap();

        let approved = queue.approve(entry.id, "alice").await.unwrap();
        assert_eq!(approved.status, UpdateStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("alice"));
        assert_eq!(approved.record_id.as_deref(), Some("lead-1"));

        let again = queue.approve(entry.id, "bob").await;
        assert!(again.unwrap_err().is_conflict());
        assert_eq!(crm.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reject_never_calls_crm_and_is_terminal() {
        let crm = Arc::new(CountingCrm::default());
        let queue = queue(crm.clone());
        let entry = queue.enqueue(lead()).await.unwrap();

        let rejected = queue.reject(entry.id, "alice").await.unwrap();
        assert_eq!(rejected.status, UpdateStatus::Rejected);
        assert!(rejected.approved_by.is_none());
        assert_eq!(rejected.reviewed_by.as_deref(), Some("alice"));

        assert!(queue.approve(entry.id, "bob").await.unwrap_err().is_conflict());
        assert!(queue.reject(entry.id, "bob").await.unwrap_err().is_conflict());
        assert_eq!(crm.creates.load(Ordering::SeqCst), 0);
        assert_eq!(crm.updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_existing_record_is_updated() {
        let crm = Arc::new(CountingCrm::default());
        let queue = queue(crm.clone());
        let entry = queue
            .enqueue(NewPendingUpdate {
                record_type: RecordType::Contact,
                record_id: Some("c-9".into()),
                field_updates: vec![FieldUpdate::new("title", "CFO")],
                enrichment_type: "prospect_discovery".into(),
            })
            .await
            .unwrap();

        queue.approve(entry.id, "alice").await.unwrap();
        assert_eq!(crm.updates.load(Ordering::SeqCst), 1);
        assert_eq!(crm.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_crm_failure_leaves_entry_pending() {
        let crm = Arc::new(CountingCrm::default());
        crm.fail.store(true, Ordering::SeqCst);
        let queue = queue(crm.clone());
        let entry = queue.enqueue(lead()).await.unwrap();

        assert!(queue.approve(entry.id, "alice").await.is_err());

        let after = queue.get(entry.id).await.unwrap();
        assert_eq!(after.status, UpdateStatus::Pending);
        assert!(after.approved_by.is_none());
        assert!(after.last_error.unwrap().contains("422"));

        crm.fail.store(false, Ordering::SeqCst);
        let approved = queue.approve(entry.id, "alice").await.unwrap();
        assert_eq!(approved.status, UpdateStatus::Approved);
        assert!(approved.last_error.is_none());
    }

    /// Blocks inside the CRM call until released, then fails.
    #[derive(Default)]
    struct GatedCrm {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CrmBackend for GatedCrm {
        async fn create_record(
            &self,
            _record_type: RecordType,
            _field_updates: &[FieldUpdate],
        ) -> Result<String, UpstreamError> {
            self.entered.notify_one();
            self.release.notified().await;
            Err(UpstreamError::Fatal("crm returned 422".into()))
        }

        async fn update_record(
            &self,
            _record_type: RecordType,
            _record_id: &str,
            _field_updates: &[FieldUpdate],
        ) -> Result<(), UpstreamError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reject_during_failing_approval_is_a_conflict() {
        let crm = Arc::new(GatedCrm::default());
        let queue = Arc::new(ApprovalQueue::new(
            Arc::new(MemoryQueueStore::new()),
            crm.clone(),
            UpstreamGuard::new("crm", RetryPolicy::default()),
        ));
        let entry = queue.enqueue(lead()).await.unwrap();

        let approving = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.approve(entry.id, "alice").await })
        };
        crm.entered.notified().await;

        // Mid-write the entry is still pending and cannot be reviewed again.
        assert_eq!(queue.get(entry.id).await.unwrap().status, UpdateStatus::Pending);
        let err = queue.reject(entry.id, "bob").await.unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("in progress"));
        assert!(queue.approve(entry.id, "carol").await.unwrap_err().is_conflict());

        crm.release.notify_one();
        assert!(approving.await.unwrap().is_err());

        let after = queue.get(entry.id).await.unwrap();
        assert_eq!(after.status, UpdateStatus::Pending);
        assert!(after.approved_by.is_none());
        assert!(after.approved_at.is_none());
        assert!(after.last_error.unwrap().contains("422"));

        let rejected = queue.reject(entry.id, "bob").await.unwrap();
        assert_eq!(rejected.status, UpdateStatus::Rejected);
        assert!(rejected.approved_by.is_none());
    }

    #[tokio::test]
    async fn test_stale_approval_claim_can_be_taken_over() {
        let store = MemoryQueueStore::new();
        let entry = store.insert(lead()).await.unwrap();
        let stale = store.begin_approval(entry.id).await.unwrap().unwrap();
        assert!(store.begin_approval(entry.id).await.unwrap().is_none());

        store.inner.lock().await.claims.insert(
            entry.id,
            (
                stale.token,
                Utc::now() - chrono::Duration::seconds(APPROVAL_CLAIM_TTL_SECS + 1),
            ),
        );
        let fresh = store.begin_approval(entry.id).await.unwrap().unwrap();
        assert_ne!(fresh.token, stale.token);

        // The abandoned holder can no longer finish.
        assert!(store
            .complete_approval(&stale, "alice", Some("lead-1"))
            .await
            .unwrap()
            .is_none());
        let approved = store
            .complete_approval(&fresh, "bob", Some("lead-2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(approved.approved_by.as_deref(), Some("bob"));
        assert_eq!(approved.record_id.as_deref(), Some("lead-2"));
    }

    #[tokio::test]
    async fn test_missing_entry_is_not_found() {
        let queue = queue(Arc::new(CountingCrm::default()));
        assert!(matches!(
            queue.approve(42, "alice").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_pending_filters_by_record_type() {
        let queue = queue(Arc::new(CountingCrm::default()));
        queue.enqueue(lead()).await.unwrap();
        queue
            .enqueue(NewPendingUpdate {
                record_type: RecordType::Account,
                record_id: Some("a-1".into()),
                field_updates: vec![],
                enrichment_type: "prospect_discovery".into(),
            })
            .await
            .unwrap();

        assert_eq!(queue.list_pending(None).await.unwrap().len(), 2);
        let leads = queue.list_pending(Some(RecordType::Lead)).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].record_type, RecordType::Lead);
    }
}
