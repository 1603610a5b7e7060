//! Income module for the agency back office.
//!
//! A REST service over PostgreSQL covering the service catalog, customer
//! subscriptions, add-on purchases, invoice generation with IVA accounting
//! entries, payment recording and the income dashboard.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use backoffice_core::error::AppError;
use backoffice_core::middleware::{
    metrics::metrics_middleware, tracing::request_id_middleware,
};
use secrecy::ExposeSecret;
use tower_http::trace::TraceLayer;

use config::Config;
use services::Database;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: tokio::net::TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;

        db.run_migrations().await?;

        services::metrics::init_metrics();

        let state = AppState {
            db,
            config: config.clone(),
        };

        let api = Router::new()
            .route(
                "/packages",
                get(handlers::packages::list_packages).post(handlers::packages::create_package),
            )
            .route(
                "/addons",
                get(handlers::addons::list_addons).post(handlers::addons::create_addon),
            )
            .route(
                "/subscriptions",
                get(handlers::subscriptions::list_subscriptions)
                    .post(handlers::subscriptions::create_subscription),
            )
            .route(
                "/addon-purchases",
                post(handlers::purchases::create_purchase),
            )
            .route(
                "/addon-purchases/unbilled",
                get(handlers::purchases::list_unbilled),
            )
            .route("/invoices", get(handlers::invoices::list_invoices))
            .route(
                "/invoices/generate",
                post(handlers::invoices::generate_invoice),
            )
            .route("/invoices/:id", get(handlers::invoices::get_invoice))
            .route(
                "/invoices/:id/payment",
                post(handlers::invoices::record_payment),
            )
            .route("/dashboard", get(handlers::dashboard::dashboard));

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics))
            .nest("/api/income", api)
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        actor_id = tracing::field::Empty,
                    )
                }),
            )
            .with_state(state);

        // Port 0 binds a random port, used by the integration tests.
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        tracing::info!("income-service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }
}
