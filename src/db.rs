use sqlx::{postgres::PgPoolOptions, PgPool};

const CREATE_PENDING_UPDATES: &str = r#"
CREATE TABLE IF NOT EXISTS pending_updates (
    id              BIGSERIAL PRIMARY KEY,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    status          TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'approved', 'rejected')),
    record_type     TEXT NOT NULL
                    CHECK (record_type IN ('account', 'contact', 'lead')),
    record_id       TEXT,
    field_updates   JSONB NOT NULL DEFAULT '[]'::jsonb,
    enrichment_type TEXT NOT NULL,
    approved_by     TEXT,
    approved_at     TIMESTAMPTZ,
    reviewed_by     TEXT,
    reviewed_at     TIMESTAMPTZ,
    last_error      TEXT,
    approval_claim      UUID,
    approval_claimed_at TIMESTAMPTZ
)
"#;

/// Tables created before approval claims existed.
const ADD_APPROVAL_CLAIM_COLUMNS: &str = r#"
ALTER TABLE pending_updates
    ADD COLUMN IF NOT EXISTS approval_claim UUID,
    ADD COLUMN IF NOT EXISTS approval_claimed_at TIMESTAMPTZ
"#;

const CREATE_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS pending_updates_status_idx
    ON pending_updates (status, record_type, id)
"#;

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        ensure_schema(&pool).await?;

        Ok(Self { pool })
    }
}

/// Creates the approval queue table if it does not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_PENDING_UPDATES).execute(pool).await?;
    sqlx::query(ADD_APPROVAL_CLAIM_COLUMNS).execute(pool).await?;
    sqlx::query(CREATE_STATUS_INDEX).execute(pool).await?;
    tracing::info!("pending_updates schema ready");
    Ok(())
}
