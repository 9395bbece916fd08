//! Router assembly and server startup.

use std::sync::Arc;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::extraction::ExtractionClient;
use crate::llm::GeminiClient;
use crate::task::{create_task_store, ExecutorLimits, TaskExecutor};

use super::system;
use super::tasks;

/// Versioned prefix for every route.
pub const API_PREFIX: &str = "/api/v1";

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Submits and runs extraction tasks; owns the task store
    pub executor: TaskExecutor,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, executor: TaskExecutor) -> Self {
        Self {
            config,
            executor,
            started_at: Utc::now(),
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/health",
            get(system::health).fallback(system::method_not_allowed),
        )
        .route(
            "/status",
            get(system::status).fallback(system::method_not_allowed),
        )
        .route(
            "/config",
            get(system::config_info).fallback(system::method_not_allowed),
        )
        .route(
            "/test",
            get(system::test_endpoint)
                .post(system::test_endpoint)
                .fallback(system::method_not_allowed),
        )
        .route(
            "/process-text-command",
            post(tasks::process_text_command).fallback(system::method_not_allowed),
        )
        .route(
            "/get-command-result/:task_id",
            get(tasks::get_command_result).fallback(system::method_not_allowed),
        );

    let cors = cors_layer(&state.config);

    Router::new()
        .nest(API_PREFIX, api)
        .fallback(system::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ]);

    if config.cors_allows_any() {
        // Credentials cannot be combined with a wildcard origin.
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin: {}", e);
                None
            }
        })
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store = create_task_store(&config.tasks).await?;
    tracing::info!(
        store = store.kind().as_str(),
        "Task store initialized"
    );

    let client = match GeminiClient::from_config(&config.llm) {
        Ok(gemini) => {
            tracing::info!(model = gemini.model(), "Gemini client configured");
            Some(ExtractionClient::new(Arc::new(gemini)))
        }
        Err(e) => {
            tracing::warn!(
                "Language model unavailable, text commands will be refused: {}",
                e
            );
            None
        }
    };

    let executor = TaskExecutor::new(store, client, ExecutorLimits::from_config(&config));
    let state = Arc::new(AppState::new(config.clone(), executor));
    let app = router(Arc::clone(&state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

/// Wait for SIGINT/SIGTERM.
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let outstanding = state.executor.outstanding();
    if outstanding > 0 {
        tracing::warn!(
            outstanding,
            "Shutting down with unfinished tasks; their records stay pending or processing"
        );
    }
    tracing::info!("Shutdown signal received");
}
