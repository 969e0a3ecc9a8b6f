//! Prints approval queue counts per record type and status.

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::env;

/// Connects to the queue database and summarizes `pending_updates`,
/// followed by the oldest pending entries that carry a CRM error.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;
    prospect_pipeline::db::ensure_schema(&pool).await?;

    let counts: Vec<(String, String, i64)> = sqlx::query_as(
        "SELECT record_type, status, COUNT(*) FROM pending_updates GROUP BY record_type, status ORDER BY record_type, status",
    )
    .fetch_all(&pool)
    .await?;

    if counts.is_empty() {
        println!("Approval queue is empty.");
        return Ok(());
    }

    println!("{:<10} {:<10} {:>8}", "TYPE", "STATUS", "COUNT");
    for (record_type, status, count) in &counts {
        println!("{:<10} {:<10} {:>8}", record_type, status, count);
    }

    let failing: Vec<(i64, String, String)> = sqlx::query_as(
        "SELECT id, record_type, last_error FROM pending_updates WHERE status = 'pending' AND last_error IS NOT NULL ORDER BY id LIMIT 20",
    )
    .fetch_all(&pool)
    .await?;

    if !failing.is_empty() {
        println!();
        println!("Pending entries with a failed CRM write:");
        for (id, record_type, error) in failing {
            println!("- #{} ({}): {}", id, record_type, error);
        }
    }

    Ok(())
}
