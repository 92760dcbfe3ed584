//! # stockavoo: accounts and access control for the Stockavoo inventory platform
//!
//! Stockavoo is a multi-tenant inventory backend for small retail businesses. This crate is
//! its identity core: who may sign in, how, and what each signed-in account may touch.
//!
//! ## Overview
//!
//! A business starts when its owner registers. The owner then invites staff (managers, clerks,
//! accountants, warehouse managers), each of whom finishes setup through an emailed link. Every
//! request after sign-in carries a bearer session token; the gatekeeper reloads the account on
//! every request so deactivation takes effect immediately, and the RBAC gates decide what the
//! account may do.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). Persistence goes through the
//! repository traits in [`db::handlers`], backed by PostgreSQL or by an in-memory store.
//!
//! ### Core Components
//!
//! The **API layer** ([`api`]) mounts everything under `/api`: `/api/auth/*` for the account
//! lifecycle and federated sign-in, `/api/users/*` for staff management and profiles, and
//! `/api/stores/*` for store management.
//!
//! The **authentication layer** ([`auth`]) holds the credential hasher, session tokens,
//! single-use email tokens, the account lifecycle and the permission matrix. Access checks
//! are extractors, so a handler only runs once its gates have passed.
//!
//! The **database layer** ([`db`]) defines [`db::handlers::AccountRepository`] and
//! [`db::handlers::StoreRepository`], with Postgres and in-memory implementations.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use stockavoo::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = stockavoo::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     stockavoo::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod errors;
mod openapi;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use axum::{
    Router,
    http::{self, HeaderValue},
    routing::{get, post, put},
};
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    api::handlers,
    auth::lifecycle::Lifecycle,
    config::CorsOrigin,
    db::Storage,
    email::{EmailService, Mailer},
    openapi::ApiDoc,
};

pub use config::Config;
pub use types::{StoreId, UserId};

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .storage(Storage::in_memory())
///     .config(config)
///     .mailer(Arc::new(EmailService::new(&config.email)?))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub storage: Storage,
    pub config: Config,
    pub mailer: Arc<dyn Mailer>,
    /// Client for OAuth provider calls
    #[builder(default)]
    pub http: reqwest::Client,
}

impl AppState {
    /// The account lifecycle bound to this state's storage, config and mailer.
    pub fn lifecycle(&self) -> Lifecycle<'_> {
        Lifecycle::new(self.storage.accounts.as_ref(), &self.config, self.mailer.clone())
    }
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.cors;
    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(cors_config.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

async fn healthz() -> &'static str {
    "OK"
}

/// Build the application router.
///
/// Authentication, users and stores are nested under `/api`, with Scalar docs at
/// `/api/docs`. `/healthz` sits outside the API for load balancer health checks.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/verify-email/{token}", get(handlers::auth::verify_email))
        .route("/resend-verification", post(handlers::auth::resend_verification))
        .route("/forgot-password", post(handlers::auth::forgot_password))
        .route("/reset-password/{token}", post(handlers::auth::reset_password))
        .route("/setup-password/{token}", post(handlers::auth::setup_password))
        .route("/me", get(handlers::auth::me))
        .route("/google", get(handlers::federated::google_start))
        .route("/google/callback", get(handlers::federated::google_callback))
        .route("/facebook", get(handlers::federated::facebook_start))
        .route("/facebook/callback", get(handlers::federated::facebook_callback));

    let user_routes = Router::new()
        .route(
            "/me",
            get(handlers::users::get_profile).put(handlers::users::update_profile),
        )
        .route("/me/password", put(handlers::users::change_password))
        .route(
            "/",
            get(handlers::users::list_users).post(handlers::users::invite_user),
        )
        .route(
            "/{id}",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        );

    let store_routes = Router::new()
        .route(
            "/",
            get(handlers::stores::list_stores).post(handlers::stores::create_store),
        )
        .route("/bulk", post(handlers::stores::bulk_create_stores))
        .route(
            "/{id}",
            get(handlers::stores::get_store)
                .put(handlers::stores::update_store)
                .delete(handlers::stores::delete_store),
        );

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/stores", store_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors = create_cors_layer(&state.config)?;

    let router = Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Container for the running application.
///
/// 1. **Create**: [`Application::new`] connects storage (running migrations for Postgres)
///    and builds the mailer, state and router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests
/// 3. **Shutdown**: when the shutdown future resolves, in-flight requests finish, then the
///    database pool closes and telemetry is flushed
pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting with configuration: {:#?}", config);

        let storage = Storage::connect(&config.database).await?;
        let mailer: Arc<dyn Mailer> = Arc::new(EmailService::new(&config.email)?);
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        let app_state = AppState::builder()
            .storage(storage)
            .config(config.clone())
            .mailer(mailer)
            .http(http)
            .build();
        let router = build_router(app_state.clone())?;

        Ok(Self {
            router,
            app_state,
            config,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Stockavoo listening on http://{}, API docs at http://localhost:{}/api/docs",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = &self.app_state.storage.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
