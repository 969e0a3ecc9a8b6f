use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prospect_pipeline::api::handlers::{self, AppState};
use prospect_pipeline::config::Config;
use prospect_pipeline::core::pipeline::{PipelineCollaborators, ProspectPipeline};
use prospect_pipeline::core::queue::{ApprovalQueue, MemoryQueueStore, PgQueueStore, QueueStore};
use prospect_pipeline::db::Database;
use prospect_pipeline::integrations::crm_client::CrmClient;
use prospect_pipeline::integrations::services::{
    PeopleSearchService, ProfileApiService, ScoringService, SearchApiService,
};
use prospect_pipeline::resilience::{RetryPolicy, UpstreamGuard};

/// Main entry point for the application.
///
/// Initializes tracing, configuration, the queue store (Postgres when
/// `DATABASE_URL` is set, in-memory otherwise), the collaborator clients and
/// the HTTP routes, then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prospect_pipeline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let policy = RetryPolicy::from_config(&config);

    let store: Arc<dyn QueueStore> = match config.database_url.as_deref() {
        Some(url) => {
            let db = Database::new(url).await?;
            tracing::info!("Database connection pool established");
            Arc::new(PgQueueStore::new(db.pool))
        }
        None => {
            tracing::warn!("Using in-memory approval queue");
            Arc::new(MemoryQueueStore::new())
        }
    };

    let crm = CrmClient::from_config(&config).map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!("✓ CRM client initialized: {}", config.crm_base_url);
    let queue = Arc::new(ApprovalQueue::new(
        store,
        Arc::new(crm),
        UpstreamGuard::new("crm", policy.clone()),
    ));

    let collaborators = PipelineCollaborators {
        source_a: Arc::new(SearchApiService::from_config(&config)),
        source_b: Arc::new(PeopleSearchService::from_config(&config)),
        enricher: Arc::new(ProfileApiService::from_config(&config)),
        scorer: Arc::new(ScoringService::from_config(&config)),
    };
    let pipeline = ProspectPipeline::new(
        config.pipeline_config(),
        policy,
        collaborators,
        queue.clone(),
    )?;

    let app_state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
        queue,
        reviewer_token: config.reviewer_token.clone(),
    });

    // 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = handlers::api_routes().layer(
        ServiceBuilder::new()
            .layer(RequestBodyLimitLayer::new(1024 * 1024))
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // SmartIpKeyExtractor falls back to the peer address
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
