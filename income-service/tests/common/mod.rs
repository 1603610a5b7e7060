//! Shared helpers for income-service integration tests.
//!
//! These tests exercise the full HTTP surface against a real PostgreSQL
//! database. They skip themselves when TEST_DATABASE_URL is not set.

#![allow(dead_code)]

use income_service::config::{Config, DatabaseConfig, ServerConfig};
use income_service::Application;
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Once;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,income_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub pool: PgPool,
}

impl TestApp {
    /// Spawn the application against TEST_DATABASE_URL. Returns None when the
    /// variable is not set, in which case the test should return early.
    pub async fn try_spawn() -> Option<TestApp> {
        let database_url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("TEST_DATABASE_URL not set; skipping integration test");
                return None;
            }
        };

        init_tracing();

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: Secret::new(database_url.clone()),
                max_connections: 2,
                min_connections: 1,
            },
            service_name: "income-service-test".to_string(),
            log_level: "debug".to_string(),
            otlp_endpoint: None,
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build application");
        let port = app.port();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("Failed to connect test pool");

        Some(TestApp {
            address: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
            pool,
        })
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}/api/income{}", self.address, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.api(path))
            .header("X-Actor-ID", "1")
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.api(path))
            .header("X-Actor-ID", "1")
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    /// Insert a customer directly; customers belong to the CRM module and
    /// have no endpoint here.
    pub async fn create_customer(&self, name: &str) -> i64 {
        sqlx::query_scalar("INSERT INTO customers (name) VALUES ($1) RETURNING customer_id")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to create customer")
    }

    /// Create a package with a unique name and return its id.
    pub async fn create_package(&self, base_price: &str) -> Uuid {
        let response = self
            .post_json(
                "/packages",
                &json!({
                    "name": format!("Package {}", Uuid::new_v4()),
                    "base_price": base_price.parse::<f64>().expect("bad price literal"),
                    "posts_per_month": 12,
                    "platforms_included": ["instagram", "facebook"],
                }),
            )
            .await;
        assert_eq!(response.status(), 201, "package creation failed");
        let body: Value = response.json().await.expect("invalid package body");
        Uuid::parse_str(body["package_id"].as_str().expect("missing package_id"))
            .expect("bad package_id")
    }

    /// Create an add-on with a unique name and return its id.
    pub async fn create_addon(&self, price: &str) -> Uuid {
        let response = self
            .post_json(
                "/addons",
                &json!({
                    "name": format!("Addon {}", Uuid::new_v4()),
                    "price": price.parse::<f64>().expect("bad price literal"),
                    "category": "design",
                }),
            )
            .await;
        assert_eq!(response.status(), 201, "add-on creation failed");
        let body: Value = response.json().await.expect("invalid add-on body");
        Uuid::parse_str(body["addon_id"].as_str().expect("missing addon_id")).expect("bad addon_id")
    }

    /// Subscribe a customer to a package and return the subscription id.
    pub async fn create_subscription(&self, customer_id: i64, package_id: Uuid) -> Uuid {
        let response = self
            .post_json(
                "/subscriptions",
                &json!({
                    "customer_id": customer_id,
                    "service_package_id": package_id,
                }),
            )
            .await;
        assert_eq!(response.status(), 201, "subscription creation failed");
        let body: Value = response.json().await.expect("invalid subscription body");
        Uuid::parse_str(
            body["subscription_id"]
                .as_str()
                .expect("missing subscription_id"),
        )
        .expect("bad subscription_id")
    }

    /// Purchase an add-on for a customer and return the purchase id.
    pub async fn create_purchase(&self, customer_id: i64, addon_id: Uuid, quantity: i32) -> Uuid {
        let response = self
            .post_json(
                "/addon-purchases",
                &json!({
                    "customer_id": customer_id,
                    "addon_id": addon_id,
                    "quantity": quantity,
                }),
            )
            .await;
        assert_eq!(response.status(), 201, "purchase creation failed");
        let body: Value = response.json().await.expect("invalid purchase body");
        Uuid::parse_str(body["purchase_id"].as_str().expect("missing purchase_id"))
            .expect("bad purchase_id")
    }

    /// Generate an invoice and return the response body.
    pub async fn generate_invoice(&self, body: &Value) -> Value {
        let response = self.post_json("/invoices/generate", body).await;
        assert_eq!(response.status(), 201, "invoice generation failed");
        response.json().await.expect("invalid generation body")
    }

    /// Journal rows for a source, as (account_code, debit, credit).
    pub async fn journal_rows(
        &self,
        source_type: &str,
        source_id: Uuid,
    ) -> Vec<(String, Decimal, Decimal)> {
        sqlx::query_as(
            "SELECT account_code, debit, credit FROM journal_entries \
             WHERE source_type = $1 AND source_id = $2 ORDER BY created_utc",
        )
        .bind(source_type)
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .expect("Failed to query journal entries")
    }
}

/// Parse a JSON value (string or number) as a Decimal.
pub fn dec(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("invalid decimal string"),
        Value::Number(n) => n.to_string().parse().expect("invalid decimal number"),
        other => panic!("expected a decimal value, got {:?}", other),
    }
}
