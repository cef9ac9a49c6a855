use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wikiguess::config::{GameConfig, ServerConfig};
use wikiguess::content::{ContentProvider, FallbackProvider, QuestionPool, WikipediaProvider};
use wikiguess::room::{MemoryRoomStore, RoomService};
use wikiguess::api;

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wikiguess=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting WikiGuess...");

    let config = GameConfig::from_env();
    let server = ServerConfig::from_env();

    let pool = match &server.question_pool {
        Some(path) => QuestionPool::load(path),
        None => QuestionPool::builtin(),
    };
    let pool: Arc<dyn ContentProvider> = match pool {
        Ok(pool) => {
            tracing::info!("Question pool ready with {} questions", pool.total());
            Arc::new(pool)
        }
        Err(e) => {
            tracing::error!("Failed to load question pool: {}", e);
            std::process::exit(1);
        }
    };

    let content: Arc<dyn ContentProvider> = match WikipediaProvider::new(
        server.wikipedia_api_base.clone(),
        server.wikipedia_action_api.clone(),
        server.wikipedia_timeout,
    ) {
        Ok(wikipedia) => Arc::new(FallbackProvider::new(
            Arc::new(wikipedia),
            pool,
            server.wikipedia_timeout,
        )),
        Err(e) => {
            tracing::warn!(
                "Failed to initialize Wikipedia provider: {}. Using the question pool only.",
                e
            );
            pool
        }
    };

    let store = Arc::new(MemoryRoomStore::new());
    let service = Arc::new(RoomService::new(store, content, config));

    let app = api::router(service)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", server.bind);

    let listener = match tokio::net::TcpListener::bind(server.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", server.bind, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
