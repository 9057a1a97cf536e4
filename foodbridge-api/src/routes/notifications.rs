/// In-app notification endpoints
///
/// - `GET /v1/notifications` - Own notifications, newest first
/// - `PUT /v1/notifications/read-all` - Mark all as read
/// - `PUT /v1/notifications/:id/read` - Mark one as read

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{Path, Query},
    response::{ApiResponse, PageParams, Paginated},
};
use axum::{extract::State, Extension, Json};
use foodbridge_shared::{auth::middleware::AuthContext, models::notification::Notification};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct NotificationList {
    #[serde(flatten)]
    pub page: Paginated<Notification>,
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<ApiResponse<NotificationList>>> {
    let page = PageParams {
        page: query.page,
        limit: query.limit,
    };

    let notifications = Notification::list_for_user(
        &state.db,
        auth.user_id,
        query.unread_only,
        page.limit(),
        page.offset(),
    )
    .await?;
    let unread = Notification::count_unread(&state.db, auth.user_id).await?;

    // Unread count doubles as the total when only unread ones are listed
    let total = if query.unread_only {
        unread
    } else {
        Notification::count_for_user(&state.db, auth.user_id).await?
    };

    Ok(ApiResponse::ok(NotificationList {
        page: Paginated::new(notifications, page, total),
        unread,
    }))
}

/// Mark one of the caller's notifications as read
///
/// Someone else's notification answers 404, same as a missing one.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    if !Notification::mark_read(&state.db, id, auth.user_id).await? {
        return Err(ApiError::NotFound("Notification not found".to_string()));
    }
    Ok(ApiResponse::ok(()))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<MarkedRead>>> {
    let updated = Notification::mark_all_read(&state.db, auth.user_id).await?;
    Ok(ApiResponse::ok(MarkedRead { updated }))
}
