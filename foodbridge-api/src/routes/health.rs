/// Health check endpoint
///
/// ```text
/// GET /health
/// ```
///
/// Always answers 200 so load balancers can tell the process is up; the body
/// reports whether the database answered.
///
/// ```json
/// {
///   "success": true,
///   "data": { "status": "healthy", "version": "0.1.0", "database": "connected" }
/// }
/// ```

use crate::{
    app::AppState,
    error::ApiResult,
    response::ApiResponse,
};
use axum::{extract::State, Json};
use foodbridge_shared::db::pool::{get_pool_stats, health_check as db_health_check, PoolStats};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,
    pub version: String,

    /// `connected` or `disconnected`
    pub database: String,
    pub pool: PoolStats,
}

pub async fn health_check(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<HealthResponse>>> {
    let connected = match db_health_check(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    };

    Ok(ApiResponse::ok(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        version: foodbridge_shared::VERSION.to_string(),
        database: if connected { "connected" } else { "disconnected" }.to_string(),
        pool: get_pool_stats(&state.db),
    }))
}
