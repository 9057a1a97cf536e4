/// User management endpoints
///
/// - `GET    /v1/users` - List users (admin; NGOs may list active volunteers)
/// - `GET    /v1/users/:id` - Profile (full for self and admins, public otherwise)
/// - `PUT    /v1/users/:id` - Activate or deactivate (admin)
/// - `DELETE /v1/users/:id` - Delete an account (admin)
/// - `PUT    /v1/users/:id/verify` - Verify or revoke verification (admin)
/// - `PUT    /v1/users/:id/trust` - Set trust score and badges (admin)
///
/// Every admin write here is audited.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{JsonBody, OptionalJsonBody, Path, Query},
    notify,
    response::{ApiResponse, PageParams, Paginated},
    routes::audit,
};
use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use foodbridge_shared::{
    auth::{
        authorization::{require_admin, require_role},
        middleware::AuthContext,
    },
    models::{
        audit::{actions, resource_types, NewAuditLog},
        user::{Availability, DeleteOutcome, User, UserFilter, UserRole},
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::types::Json as SqlJson;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<UserRole>,
    pub is_verified: Option<bool>,
    pub is_active: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// What other users may see of an account
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub name: String,
    pub role: UserRole,
    pub organization_name: Option<String>,
    pub is_verified: bool,
    pub trust_score: i32,
    pub trust_badges: Vec<String>,
    pub availability: Option<SqlJson<Availability>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            role: user.role,
            organization_name: user.organization_name,
            is_verified: user.is_verified,
            trust_score: user.trust_score,
            trust_badges: user.trust_badges,
            availability: user.availability,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UserView {
    Full(User),
    Public(PublicProfile),
}

impl UserView {
    fn for_viewer(auth: &AuthContext, user: User) -> Self {
        if auth.owns_or_admin(user.id) {
            UserView::Full(user)
        } else {
            UserView::Public(user.into())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct VerifyUserRequest {
    #[serde(default = "default_verified")]
    pub verified: bool,
}

fn default_verified() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct TrustRequest {
    #[validate(range(min = 0, max = 100, message = "Trust score must be between 0 and 100"))]
    pub trust_score: Option<i32>,

    #[validate(length(max = 20, message = "At most 20 badges"))]
    pub trust_badges: Option<Vec<String>>,
}

/// Narrows a listing to what the caller may see
///
/// NGOs look up volunteers to assign and only ever get active volunteers.
fn scoped_filter(auth: &AuthContext, query: &UserQuery) -> ApiResult<UserFilter> {
    require_role(auth, &[UserRole::Ngo])?;

    if auth.is_admin() {
        Ok(UserFilter {
            role: query.role,
            is_verified: query.is_verified,
            is_active: query.is_active,
        })
    } else {
        Ok(UserFilter {
            role: Some(UserRole::Volunteer),
            is_verified: query.is_verified,
            is_active: Some(true),
        })
    }
}

fn refuse_self(auth: &AuthContext, id: Uuid, action: &str) -> ApiResult<()> {
    if auth.user_id == id {
        return Err(ApiError::BadRequest(format!(
            "Administrators cannot {} their own account",
            action
        )));
    }
    Ok(())
}

fn not_found() -> ApiError {
    ApiError::NotFound("User not found".to_string())
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<ApiResponse<Paginated<UserView>>>> {
    let filter = scoped_filter(&auth, &query)?;
    let page = PageParams {
        page: query.page,
        limit: query.limit,
    };

    let users = User::list(&state.db, &filter, page.limit(), page.offset()).await?;
    let total = User::count(&state.db, &filter).await?;

    let views = users
        .into_iter()
        .map(|user| UserView::for_viewer(&auth, user))
        .collect();

    Ok(ApiResponse::ok(Paginated::new(views, page, total)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<UserView>>> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(not_found)?;

    Ok(ApiResponse::ok(UserView::for_viewer(&auth, user)))
}

/// Activate or deactivate an account
///
/// Deactivated users can't log in or refresh, and access tokens they already
/// hold are refused from the next request on.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<UpdateUserRequest>,
) -> ApiResult<Json<ApiResponse<User>>> {
    require_admin(&auth)?;
    if !req.is_active {
        refuse_self(&auth, id, "deactivate")?;
    }

    let user = User::set_active(&state.db, id, req.is_active)
        .await?
        .ok_or_else(not_found)?;

    if req.is_active {
        state.deactivated.remove(&id);
    } else {
        state.deactivated.insert(id);
    }

    let action = if req.is_active {
        actions::USER_ACTIVATE
    } else {
        actions::USER_DEACTIVATE
    };
    audit::record(
        &state,
        NewAuditLog {
            actor_id: auth.user_id,
            action,
            resource_type: resource_types::USER,
            resource_id: Some(id),
            details: json!({ "is_active": req.is_active }),
        },
    )
    .await;

    tracing::info!(user_id = %id, admin_id = %auth.user_id, is_active = req.is_active, "User activation changed");
    Ok(ApiResponse::ok(user))
}

/// Delete an account
///
/// # Errors
///
/// - `409 Conflict`: the user is on a live pickup or holds a claimed or
///   moving donation
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    require_admin(&auth)?;
    refuse_self(&auth, id, "delete")?;

    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(not_found)?;

    match User::delete(&state.db, id).await? {
        DeleteOutcome::Deleted => {}
        DeleteOutcome::NotFound => return Err(not_found()),
        DeleteOutcome::InUse => {
            return Err(ApiError::Conflict(
                "User is part of an active claim or pickup; finish or cancel it first"
                    .to_string(),
            ))
        }
    }
    state.deactivated.insert(id);

    audit::record(
        &state,
        NewAuditLog {
            actor_id: auth.user_id,
            action: actions::USER_DELETE,
            resource_type: resource_types::USER,
            resource_id: Some(id),
            details: json!({ "email": user.email, "role": user.role }),
        },
    )
    .await;

    tracing::warn!(user_id = %id, admin_id = %auth.user_id, "User deleted");
    Ok(ApiResponse::with_message((), "User deleted"))
}

/// Mark an account verified, or revoke with `{"verified": false}`
///
/// An empty body verifies; a body that doesn't parse is 422.
pub async fn verify_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    OptionalJsonBody(body): OptionalJsonBody<VerifyUserRequest>,
) -> ApiResult<Json<ApiResponse<User>>> {
    require_admin(&auth)?;
    let verified = body.map_or(true, |req| req.verified);

    let user = User::set_verification(&state.db, id, verified, auth.user_id)
        .await?
        .ok_or_else(not_found)?;

    audit::record(
        &state,
        NewAuditLog {
            actor_id: auth.user_id,
            action: actions::USER_VERIFY,
            resource_type: resource_types::USER,
            resource_id: Some(id),
            details: json!({ "verified": verified }),
        },
    )
    .await;

    if verified {
        notify::account_verified(&state.db, id);
    }

    Ok(ApiResponse::ok(user))
}

/// Set trust score (0-100) and/or badges
pub async fn update_trust(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<TrustRequest>,
) -> ApiResult<Json<ApiResponse<User>>> {
    require_admin(&auth)?;
    req.validate()?;
    if req.trust_score.is_none() && req.trust_badges.is_none() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    let details = json!({
        "trust_score": req.trust_score,
        "trust_badges": req.trust_badges,
    });

    let user = User::update_trust(&state.db, id, req.trust_score, req.trust_badges)
        .await?
        .ok_or_else(not_found)?;

    audit::record(
        &state,
        NewAuditLog {
            actor_id: auth.user_id,
            action: actions::USER_TRUST_UPDATE,
            resource_type: resource_types::USER,
            resource_id: Some(id),
            details,
        },
    )
    .await;

    Ok(ApiResponse::ok(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: UserRole) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn test_ngo_listing_limited_to_active_volunteers() {
        let query = UserQuery {
            role: Some(UserRole::Admin),
            is_active: Some(false),
            ..Default::default()
        };
        let filter = scoped_filter(&ctx(UserRole::Ngo), &query).unwrap();
        assert_eq!(filter.role, Some(UserRole::Volunteer));
        assert_eq!(filter.is_active, Some(true));
    }

    #[test]
    fn test_admin_listing_passes_filters() {
        let query = UserQuery {
            role: Some(UserRole::Donor),
            is_verified: Some(false),
            ..Default::default()
        };
        let filter = scoped_filter(&ctx(UserRole::Admin), &query).unwrap();
        assert_eq!(filter.role, Some(UserRole::Donor));
        assert_eq!(filter.is_verified, Some(false));
        assert_eq!(filter.is_active, None);
    }

    #[test]
    fn test_other_roles_cannot_list() {
        let query = UserQuery::default();
        assert!(scoped_filter(&ctx(UserRole::Donor), &query).is_err());
        assert!(scoped_filter(&ctx(UserRole::Volunteer), &query).is_err());
    }

    #[test]
    fn test_admin_cannot_target_self() {
        let admin = ctx(UserRole::Admin);
        assert!(refuse_self(&admin, admin.user_id, "delete").is_err());
        assert!(refuse_self(&admin, Uuid::new_v4(), "delete").is_ok());
    }

    #[test]
    fn test_trust_score_range() {
        let req = TrustRequest {
            trust_score: Some(101),
            trust_badges: None,
        };
        assert!(req.validate().is_err());

        let req = TrustRequest {
            trust_score: Some(80),
            trust_badges: Some(vec!["reliable".to_string()]),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_verify_defaults_to_true() {
        let req: VerifyUserRequest = serde_json::from_str("{}").unwrap();
        assert!(req.verified);
    }
}
