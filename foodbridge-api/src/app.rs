/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use foodbridge_api::{app::{build_router, AppState}, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let app = build_router(AppState::new(pool, config));
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::ApiError,
    middleware::{rate_limit::RateLimiter, security::SecurityHeadersLayer},
    routes,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post, put},
    Router,
};
use dashmap::DashSet;
use foodbridge_shared::{auth::middleware::authenticate, models::user::User};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use uuid::Uuid;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub rate_limiter: Arc<RateLimiter>,

    /// Accounts whose unexpired access tokens must stop working
    ///
    /// Seeded from the database at startup and kept current by the admin
    /// user endpoints.
    pub deactivated: Arc<DashSet<Uuid>>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.requests_per_minute));
        Self {
            db,
            config: Arc::new(config),
            rate_limiter,
            deactivated: Arc::new(DashSet::new()),
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    /// Loads deactivated accounts into the token deny set
    pub async fn load_deactivated(&self) -> Result<usize, sqlx::Error> {
        let ids = User::inactive_ids(&self.db).await?;
        let count = ids.len();
        for id in ids {
            self.deactivated.insert(id);
        }
        Ok(count)
    }
}

/// Builds the complete router with all routes and middleware
///
/// ```text
/// /health                                  public
/// /v1/auth/{register,login,refresh}        public
/// /v1/impact/platform                      public
/// /v1/auth/{me,profile,password}           bearer
/// /v1/donations/...                        bearer
/// /v1/pickups/...                          bearer
/// /v1/users/...                            bearer
/// /v1/notifications/...                    bearer
/// /v1/analytics/overview                   bearer (admin)
/// /v1/impact/{me,users/:id}                bearer
/// /v1/audit                                bearer (admin)
/// ```
///
/// Bearer routes run JWT authentication, then the per-user rate limiter.
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let public_routes = Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route("/impact/platform", get(routes::analytics::platform_impact));

    let account_routes = Router::new()
        .route("/me", get(routes::auth::me))
        .route("/profile", put(routes::auth::update_profile))
        .route("/password", put(routes::auth::change_password));

    let donation_routes = Router::new()
        .route(
            "/",
            get(routes::donations::list_donations).post(routes::donations::create_donation),
        )
        .route(
            "/:id",
            get(routes::donations::get_donation)
                .put(routes::donations::update_donation)
                .delete(routes::donations::delete_donation),
        )
        .route("/:id/claim", post(routes::donations::claim_donation))
        .route("/:id/release", post(routes::donations::release_donation))
        .route("/:id/verify", put(routes::donations::verify_donation))
        .route("/:id/status", put(routes::donations::set_donation_status))
        .route("/:id/feedback", post(routes::donations::submit_feedback));

    let pickup_routes = Router::new()
        .route(
            "/",
            get(routes::pickups::list_pickups).post(routes::pickups::create_pickup),
        )
        .route("/:id", get(routes::pickups::get_pickup))
        .route("/:id/status", put(routes::pickups::set_pickup_status))
        .route("/:id/location", put(routes::pickups::record_location))
        .route("/:id/verify-pickup", put(routes::pickups::verify_pickup))
        .route("/:id/verify-delivery", put(routes::pickups::verify_delivery))
        .route("/:id/complete", put(routes::pickups::complete_pickup))
        .route("/:id/rating", post(routes::pickups::rate_pickup));

    let user_routes = Router::new()
        .route("/", get(routes::users::list_users))
        .route(
            "/:id",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .delete(routes::users::delete_user),
        )
        .route("/:id/verify", put(routes::users::verify_user))
        .route("/:id/trust", put(routes::users::update_trust));

    let notification_routes = Router::new()
        .route("/", get(routes::notifications::list_notifications))
        .route("/read-all", put(routes::notifications::mark_all_read))
        .route("/:id/read", put(routes::notifications::mark_read));

    let protected_routes = Router::new()
        .nest("/auth", account_routes)
        .nest("/donations", donation_routes)
        .nest("/pickups", pickup_routes)
        .nest("/users", user_routes)
        .nest("/notifications", notification_routes)
        .route("/analytics/overview", get(routes::analytics::overview))
        .route("/impact/me", get(routes::analytics::my_impact))
        .route("/impact/users/:id", get(routes::analytics::user_impact))
        .route("/audit", get(routes::audit::list_audit_logs))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit::rate_limit_layer,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let v1_routes = Router::new().merge(public_routes).merge(protected_routes);

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// Permissive when `CORS_ORIGINS` contains `*`, otherwise the listed origins
fn cors_layer(config: &Config) -> CorsLayer {
    if config.api.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Validates the bearer token and stores the caller's `AuthContext` in the
/// request extensions
///
/// Tokens of deactivated or deleted accounts are refused with 403.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = authenticate(req.headers(), state.jwt_secret())?;
    if state.deactivated.contains(&auth.user_id) {
        tracing::info!(user_id = %auth.user_id, "Token of deactivated account refused");
        return Err(ApiError::Forbidden("Account is deactivated".to_string()));
    }

    tracing::debug!(user_id = %auth.user_id, role = %auth.role, "Authenticated request");
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}
