//! Shared infrastructure for API integration tests
//!
//! - [`lazy_app`], [`lazy_state`]: a router (or its state) over a pool that never connects, for requests
//!   that are answered before any query runs (auth, role checks, validation)
//! - [`TestContext`]: a router over a migrated database; None when
//!   `DATABASE_URL` is unset so the suite passes without PostgreSQL
//! - [`send`]: drive one request through the router and decode the envelope

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use foodbridge_api::{
    app::{build_router, AppState},
    config::Config,
};
use foodbridge_shared::{
    auth::jwt,
    db::{
        migrations::{ensure_database_exists, run_migrations},
        pool::{create_pool, DatabaseConfig},
    },
    models::user::UserRole,
};
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "Harvest2024";

/// State whose pool points at a closed port and gives up quickly
pub fn lazy_state(config: Config) -> AppState {
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(250))
        .connect_lazy(&config.database.url)
        .expect("lazy pool");
    AppState::new(pool, config)
}

/// Router over [`lazy_state`]
pub fn lazy_app(config: Config) -> Router {
    build_router(lazy_state(config))
}

pub fn offline_config() -> Config {
    Config::for_tests("postgresql://foodbridge@127.0.0.1:1/unreachable")
}

/// Bearer token for an arbitrary user id, signed with the test secret
pub fn token_for(config: &Config, user_id: Uuid, role: UserRole) -> String {
    jwt::issue_token_pair(user_id, role, &config.jwt.secret, config.access_token_ttl())
        .expect("issue tokens")
        .access_token
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Sends one request; the body is parsed as JSON, or Null when empty
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    Response {
        status,
        headers,
        body,
    }
}

/// A registered account as seen by the tests
pub struct Account {
    pub id: Uuid,
    pub token: String,
}

pub struct TestContext {
    pub db: PgPool,
    pub app: Router,
    pub config: Config,
}

impl TestContext {
    /// Connects, migrates and builds the router, or None without DATABASE_URL
    pub async fn new() -> Option<Self> {
        dotenvy::dotenv().ok();

        let url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("DATABASE_URL not set; skipping database test");
                return None;
            }
        };

        ensure_database_exists(&url)
            .await
            .expect("Failed to create test database");
        let db = create_pool(DatabaseConfig {
            url: url.clone(),
            max_connections: 5,
            ..Default::default()
        })
        .await
        .expect("Failed to connect to test database");
        run_migrations(&db).await.expect("Failed to run migrations");

        let config = Config::for_tests(&url);
        let app = build_router(AppState::new(db.clone(), config.clone()));

        Some(Self { db, app, config })
    }

    /// Registers a fresh account through the API
    pub async fn register(&self, role: UserRole) -> Account {
        let response = send(
            &self.app,
            Method::POST,
            "/v1/auth/register",
            None,
            Some(json!({
                "email": format!("{}-{}@test.foodbridge.org", role, Uuid::new_v4()),
                "password": PASSWORD,
                "name": format!("Test {}", role),
                "role": role,
                "organization_name": "Eastside Community Pantry",
                "location": { "latitude": 40.7306, "longitude": -73.9866 }
            })),
        )
        .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);

        Account {
            id: response.body["data"]["user"]["id"]
                .as_str()
                .and_then(|id| id.parse().ok())
                .expect("user id"),
            token: response.body["data"]["access_token"]
                .as_str()
                .expect("access token")
                .to_string(),
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        account: &Account,
        body: Option<Value>,
    ) -> Response {
        send(&self.app, method, uri, Some(&account.token), body).await
    }
}

/// Polls until `condition` holds or the timeout passes
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    loop {
        if condition().await {
            return true;
        }
        if start.elapsed() > timeout {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
