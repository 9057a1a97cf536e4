/// Analytics and impact endpoints
///
/// - `GET /v1/analytics/overview` - Platform dashboard (admin)
/// - `GET /v1/impact/me` - Caller's own impact
/// - `GET /v1/impact/users/:id` - A user's impact (self or admin)
/// - `GET /v1/impact/platform` - Public platform totals, no auth

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::Path,
    response::ApiResponse,
};
use axum::{extract::State, Extension, Json};
use foodbridge_shared::{
    auth::{
        authorization::{require_admin, require_owner_or_admin},
        middleware::AuthContext,
    },
    models::{
        impact::{self, PlatformImpact, PlatformOverview, UserImpact},
        user::User,
    },
};
use uuid::Uuid;

pub async fn overview(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<PlatformOverview>>> {
    require_admin(&auth)?;
    Ok(ApiResponse::ok(impact::overview(&state.db).await?))
}

pub async fn my_impact(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<UserImpact>>> {
    impact_for(&state, auth.user_id).await
}

pub async fn user_impact(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<UserImpact>>> {
    require_owner_or_admin(&auth, id)?;
    impact_for(&state, id).await
}

/// Public totals for the landing page
pub async fn platform_impact(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<PlatformImpact>>> {
    Ok(ApiResponse::ok(impact::platform_impact(&state.db).await?))
}

async fn impact_for(state: &AppState, user_id: Uuid) -> ApiResult<Json<ApiResponse<UserImpact>>> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::ok(impact::user_impact(&state.db, &user).await?))
}
