//! Library Lending Server
//!
//! REST API server for borrowing and reserving library books.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use library_lending_server::{
    api,
    config::AppConfig,
    repository::Repository,
    services::{lending, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("library_lending_server={},tower_http=debug", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Library Lending Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Database migrations completed");

    let server_host = config.server.host.clone();
    let server_port = config.server.port;
    let sweep_interval = Duration::from_secs(config.lending.expiry_sweep_interval_secs.max(1));

    // Create repository and services
    let repository = Repository::new(pool);
    let (services, promotions) =
        Services::new(repository, config.auth.clone(), config.lending.clone());

    services.users.ensure_bootstrap_librarian().await?;

    // Background jobs
    lending::spawn_promotion_worker(services.lending.clone(), promotions);
    lending::spawn_expiry_sweeper(services.lending.clone(), sweep_interval);

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = create_router(state);

    let addr = SocketAddr::new(server_host.parse()?, server_port);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Authentication
        .route("/auth/login", post(api::auth::login))
        .route("/auth/register", post(api::auth::register))
        .route("/auth/me", get(api::auth::me))
        .route("/auth/profile", put(api::auth::update_profile))
        .route("/auth/password", put(api::auth::change_password))
        // Books (catalog)
        .route("/books", get(api::books::list_books).post(api::books::create_book))
        .route("/books/recent", get(api::books::recent_books))
        .route(
            "/books/:id",
            get(api::books::get_book)
                .put(api::books::update_book)
                .delete(api::books::delete_book),
        )
        .route("/books/:id/borrow", post(api::books::request_borrow))
        .route("/books/:id/reserve", post(api::books::reserve_book))
        .route("/books/:id/reservations", get(api::books::book_queue))
        .route("/books/:id/promote", post(api::books::promote_next))
        // Borrows
        .route("/borrows", get(api::borrows::list_borrows))
        .route("/borrows/pending", get(api::borrows::pending_borrows))
        .route("/borrows/active", get(api::borrows::active_borrows))
        .route("/borrows/overdue", get(api::borrows::overdue_borrows))
        .route("/borrows/history", get(api::borrows::borrow_history))
        .route("/borrows/mine", get(api::borrows::my_borrows))
        .route("/borrows/:id", get(api::borrows::get_borrow))
        .route("/borrows/:id/approve", post(api::borrows::approve_borrow))
        .route("/borrows/:id/reject", post(api::borrows::reject_borrow))
        .route("/borrows/:id/return", post(api::borrows::return_borrow))
        // Reservations
        .route("/reservations/mine", get(api::reservations::my_reservations))
        .route("/reservations/:id/cancel", post(api::reservations::cancel_reservation))
        .route("/reservations/expire", post(api::reservations::expire_reservations))
        // Users
        .route("/users", get(api::users::list_users))
        .route("/users", post(api::users::create_user))
        .route("/users/:id", get(api::users::get_user))
        .route("/users/:id", put(api::users::update_user))
        .route("/users/:id", delete(api::users::delete_user))
        .route("/users/:id/borrows", get(api::borrows::user_borrows))
        .route("/users/:id/reservations", get(api::users::user_reservations))
        // Reports
        .route("/reports/books", get(api::reports::book_report))
        .route("/reports/borrows", get(api::reports::borrow_report))
        .with_state(state);

    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
