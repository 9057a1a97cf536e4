/// Audit trail endpoint and recording helper
///
/// - `GET /v1/audit` - List audit entries (admin only)
///
/// Filters: `action`, `resource_type`, `resource_id`, `actor_id`, plus
/// `page`/`limit`. Newest entries first.

use crate::{
    app::AppState,
    error::ApiResult,
    extract::Query,
    response::{ApiResponse, PageParams, Paginated},
};
use axum::{extract::State, Extension, Json};
use foodbridge_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    models::audit::{AuditFilter, AuditLog, NewAuditLog},
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Records an audit entry without failing the request
///
/// The action has already been committed when this runs, so a failed insert
/// is logged rather than surfaced.
pub(crate) async fn record(state: &AppState, entry: NewAuditLog<'_>) {
    let (action, resource_id) = (entry.action, entry.resource_id);
    if let Err(e) = AuditLog::record(&state.db, entry).await {
        tracing::warn!(
            action,
            resource_id = ?resource_id,
            error = %e,
            "Failed to record audit log"
        );
    }
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<ApiResponse<Paginated<AuditLog>>>> {
    require_admin(&auth)?;

    let page = PageParams {
        page: query.page,
        limit: query.limit,
    };
    let filter = AuditFilter {
        action: query.action,
        resource_type: query.resource_type,
        resource_id: query.resource_id,
        actor_id: query.actor_id,
    };

    let logs = AuditLog::list(&state.db, &filter, page.limit(), page.offset()).await?;
    let total = AuditLog::count(&state.db, &filter).await?;

    Ok(ApiResponse::ok(Paginated::new(logs, page, total)))
}
