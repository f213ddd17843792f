use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedkeeper::config::Config;
use feedkeeper::db::Database;
use feedkeeper::fetcher::Fetcher;
use feedkeeper::routes::{self, AppState};
use feedkeeper::sync::{start_periodic_sync, Syncer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feedkeeper=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("FEEDKEEPER_CONFIG").unwrap_or_else(|_| "feedkeeper.toml".to_string());
    let config = Config::load_or_default(&config_path)?;
    info!("Loaded configuration from {}", config_path);

    // Initialize database
    let database_url = std::env::var("DATABASE_URL").unwrap_or(config.database_url.clone());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    info!("Database initialized");

    let db = Arc::new(db);

    let fetcher = Fetcher::new(&config.fetch)?;
    let syncer = Arc::new(Syncer::new(db.clone(), db.clone(), fetcher));

    if config.refresh_interval > 0 {
        let bg_syncer = syncer.clone();
        let refresh_interval = config.refresh_interval;
        tokio::spawn(async move {
            start_periodic_sync(bg_syncer, refresh_interval).await;
        });
    }

    let state = Arc::new(AppState {
        db: db.clone(),
        syncer,
    });
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Server starting on http://{}", config.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
