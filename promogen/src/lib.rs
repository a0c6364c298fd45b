//! # promogen: product photo and video generation service
//!
//! `promogen` turns two photos (a product and a person) into a composited marketing image, and
//! that image into a short showcase video, using hosted generative models. Every generation is
//! paid for with credits that are granted when the identity provider reports a new user or a
//! paid plan, and refunded when a generation fails.
//!
//! ## Architecture
//!
//! ```text
//!   browser ──bearer JWT──► /api/project/*, /api/user/*  ──► GenerationService ──► SynthesisClient
//!                                 │                               │      │
//!   identity provider ──svix──► /api/clerk                        │      └──► ObjectStore (/media or S3)
//!                                 │                               │
//!                                 └────────────► Datastore ◄──────┘
//!                                           (PostgreSQL or memory)
//! ```
//!
//! - [`api`]: HTTP handlers and request/response models
//! - [`auth`]: Session token verification and the [`CurrentUser`](api::models::users::CurrentUser) extractor
//! - [`generation`]: Credit reservations and the image and video pipelines
//! - [`synthesis`]: Client for the hosted image and video models
//! - [`storage`]: Object storage for uploaded and generated media
//! - [`webhooks`]: Signature verification and handling of identity provider events
//! - [`db`]: Persistence of users and projects
//!
//! Generation work runs on tasks owned by the [`GenerationService`](generation::GenerationService)
//! rather than on the request future, so a client disconnecting mid-request cannot leave credits
//! debited for work that never finished. On shutdown those tasks are cancelled and refunded
//! before the process exits.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod generation;
pub mod openapi;
pub mod storage;
pub mod synthesis;
pub mod telemetry;
pub mod types;
pub mod webhooks;

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod test;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue},
    routing::{delete, get, post},
};
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
pub use types::{ProjectId, UserId};

use crate::{
    config::{CorsOrigin, DatabaseConfig, PoolSettings, StorageConfig},
    db::{Datastore, InMemoryDatastore, PgDatastore},
    generation::GenerationService,
    openapi::ApiDoc,
    storage::{ObjectStore, create_object_store},
    synthesis::create_synthesis_client,
};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .store(store)
///     .objects(objects)
///     .generation(generation)
///     .config(config)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub store: Arc<dyn Datastore>,
    pub objects: Arc<dyn ObjectStore>,
    pub generation: GenerationService,
    pub config: Config,
}

/// Get the promogen database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

async fn connect_pool(url: &str, settings: &PoolSettings) -> anyhow::Result<PgPool> {
    let optional = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(optional(settings.idle_timeout_secs))
        .max_lifetime(optional(settings.max_lifetime_secs))
        .connect(url)
        .await?;
    Ok(pool)
}

/// Connect to the configured datastore, running migrations for PostgreSQL.
///
/// The pool is returned alongside the store so it can be closed on shutdown.
pub async fn setup_database(config: &Config) -> anyhow::Result<(Arc<dyn Datastore>, Option<PgPool>)> {
    match &config.database {
        DatabaseConfig::External { url, pool: settings } => {
            info!("Connecting to PostgreSQL");
            let pool = connect_pool(url, settings).await?;
            migrator().run(&pool).await?;
            Ok((Arc::new(PgDatastore::new(pool.clone())), Some(pool)))
        }
        DatabaseConfig::Memory => {
            info!("Using in-memory datastore; data is lost on shutdown");
            Ok((Arc::new(InMemoryDatastore::new()), None))
        }
    }
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.cors;
    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Browsers send origins without a trailing slash
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::DELETE])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(cors_config.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router: the `/api` surface, media, docs, CORS and request tracing.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers::{projects, users, webhooks};

    // Two images plus the text fields; each image is also capped while streaming
    let upload_limit = state.config.limits.max_image_bytes.saturating_mul(2).saturating_add(1024 * 1024);

    let api_routes = Router::new()
        .route(
            "/project/create",
            post(projects::create_project).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/project/video", post(projects::generate_video))
        .route("/project/published", get(projects::list_published))
        .route("/project/{project_id}", delete(projects::delete_project))
        .route("/user/credits", get(users::get_credits))
        .route("/user/projects", get(users::list_projects))
        .route("/user/projects/{project_id}", get(users::get_project))
        .route("/user/publish/{project_id}", get(users::toggle_publish))
        .route("/clerk", post(webhooks::identity_webhook));

    let mut router = Router::new()
        .route("/", get(|| async { "Server is Live!" }))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api", api_routes)
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    if let StorageConfig::Local { path, .. } = &state.config.storage {
        debug!("Serving local media from {}", path.display());
        router = router.nest_service("/media", ServeDir::new(path));
    }

    let router = router.layer(create_cors_layer(&state.config)?).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

pub struct Application {
    router: Router,
    state: AppState,
    pool: Option<PgPool>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting promogen with configuration: {:#?}", config);

        let (store, pool) = setup_database(&config).await?;
        let objects = create_object_store(&config.storage).await?;
        let synthesis = create_synthesis_client(&config.synthesis)?;

        let generation = GenerationService::builder()
            .store(store.clone())
            .objects(objects.clone())
            .synthesis(synthesis)
            .credits(config.credits.clone())
            .timing(config.generation.clone())
            .build();

        let state = AppState::builder()
            .store(store)
            .objects(objects)
            .generation(generation)
            .config(config)
            .build();

        Self::from_state(state, pool)
    }

    /// Build the router around already constructed state
    pub fn from_state(state: AppState, pool: Option<PgPool>) -> anyhow::Result<Self> {
        let router = build_router(&state)?;
        Ok(Self { router, state, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Serve until `shutdown` resolves, then drain in-flight generations and release resources
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.state.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "promogen listening on http://{}, available at http://localhost:{}",
            bind_addr, self.state.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Cancelled generations refund their reservations before the pool goes away
        info!("Stopping in-flight generations...");
        self.state.generation.shutdown().await;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
