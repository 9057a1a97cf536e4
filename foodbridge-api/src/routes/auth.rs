/// Authentication and own-account endpoints
///
/// - `POST /v1/auth/register` - Register and get tokens
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Exchange a refresh token for a new pair
/// - `GET  /v1/auth/me` - Current user
/// - `PUT  /v1/auth/profile` - Update own profile
/// - `PUT  /v1/auth/password` - Change password

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::JsonBody,
    response::ApiResponse,
    routes::nullable,
};
use axum::{extract::State, Extension, Json};
use foodbridge_shared::{
    auth::{
        jwt::{self, TokenPair},
        middleware::AuthContext,
        password,
    },
    geo::GeoPoint,
    models::user::{Availability, CreateUser, UpdateProfile, User, UserRole},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Strength is checked separately against the password policy
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,

    /// Any role except admin
    pub role: UserRole,

    #[validate(length(max = 200, message = "Organization name must be at most 200 characters"))]
    pub organization_name: Option<String>,

    #[validate(length(max = 500, message = "Address must be at most 500 characters"))]
    pub address: Option<String>,

    pub location: Option<GeoPoint>,
    pub availability: Option<Availability>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Returned by register and login
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,

    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 200, message = "Organization name must be at most 200 characters"))]
    pub organization_name: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 500, message = "Address must be at most 500 characters"))]
    pub address: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<GeoPoint>>,

    #[serde(default, deserialize_with = "nullable")]
    pub availability: Option<Option<Availability>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    pub new_password: String,
}

fn check_password_policy(password: &str) -> ApiResult<()> {
    password::validate_password_strength(password).map_err(|e| ApiError::invalid("password", e))
}

fn check_availability(availability: Option<&Availability>) -> ApiResult<()> {
    match availability {
        Some(a) => a.check().map_err(|e| ApiError::invalid("availability", e)),
        None => Ok(()),
    }
}

fn issue_tokens(state: &AppState, user: &User) -> ApiResult<TokenPair> {
    Ok(jwt::issue_token_pair(
        user.id,
        user.role,
        state.jwt_secret(),
        state.config.access_token_ttl(),
    )?)
}

/// Register a new account
///
/// ```text
/// POST /v1/auth/register
///
/// {
///   "email": "pantry@example.org",
///   "password": "Harvest2024",
///   "name": "Eastside Pantry",
///   "role": "ngo",
///   "organization_name": "Eastside Community Pantry",
///   "location": { "latitude": 40.71, "longitude": -74.0 }
/// }
/// ```
///
/// # Errors
///
/// - `403 Forbidden`: role is admin
/// - `409 Conflict`: email already registered
/// - `422 Unprocessable Entity`: validation failed
pub async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ApiResult<Json<ApiResponse<AuthResponse>>> {
    req.validate()?;
    check_password_policy(&req.password)?;
    if let Some(point) = &req.location {
        point.check()?;
    }
    check_availability(req.availability.as_ref())?;

    if req.role == UserRole::Admin {
        return Err(ApiError::Forbidden(
            "Admin accounts cannot be self-registered".to_string(),
        ));
    }

    let password_hash = password::hash_password(&req.password)?;

    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email,
            password_hash,
            name: req.name,
            phone: req.phone,
            role: req.role,
            organization_name: req.organization_name,
            address: req.address,
            location: req.location,
            availability: req.availability,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, role = %user.role, "User registered");

    let tokens = issue_tokens(&state, &user)?;
    Ok(ApiResponse::with_message(
        AuthResponse { user, tokens },
        "Registration successful",
    ))
}

/// Login with email and password
///
/// # Errors
///
/// - `401 Unauthorized`: unknown email or wrong password
/// - `403 Forbidden`: account deactivated
pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<Json<ApiResponse<AuthResponse>>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let Some(user) = User::find_by_email(&state.db, &req.email).await? else {
        // Same Argon2 cost as a wrong password, so timing doesn't reveal accounts
        password::verify_decoy(&req.password);
        return Err(invalid());
    };

    if !password::compare_password(&req.password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "Failed login attempt");
        return Err(invalid());
    }

    if !user.is_active {
        return Err(ApiError::Forbidden("Account is deactivated".to_string()));
    }

    User::update_last_login(&state.db, user.id).await?;

    let tokens = issue_tokens(&state, &user)?;
    Ok(ApiResponse::ok(AuthResponse { user, tokens }))
}

/// Exchange a refresh token for a fresh token pair
///
/// The user is reloaded, so role changes and deactivation apply here.
pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RefreshRequest>,
) -> ApiResult<Json<ApiResponse<TokenPair>>> {
    let claims = jwt::validate_refresh_token(&req.refresh_token, state.jwt_secret())?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

    if !user.is_active {
        return Err(ApiError::Forbidden("Account is deactivated".to_string()));
    }

    Ok(ApiResponse::ok(issue_tokens(&state, &user)?))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<User>>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::ok(user))
}

/// Update own profile
///
/// Absent fields are left alone; `null` clears an optional field. Email,
/// role, verification and trust are not editable here.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    JsonBody(req): JsonBody<UpdateProfileRequest>,
) -> ApiResult<Json<ApiResponse<User>>> {
    req.validate()?;
    if let Some(Some(point)) = &req.location {
        point.check()?;
    }
    if let Some(availability) = &req.availability {
        check_availability(availability.as_ref())?;
    }

    let changes = UpdateProfile {
        name: req.name,
        phone: req.phone,
        organization_name: req.organization_name,
        address: req.address,
        location: req.location,
        availability: req.availability,
    };
    if changes.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    let user = User::update_profile(&state.db, auth.user_id, changes)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::with_message(user, "Profile updated"))
}

/// Change password; the current password must match
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    JsonBody(req): JsonBody<ChangePasswordRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    req.validate()?;

    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !password::compare_password(&req.current_password, &user.password_hash)? {
        return Err(ApiError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }
    check_password_policy(&req.new_password)?;

    let password_hash = password::hash_password(&req.new_password)?;
    User::update_password(&state.db, user.id, &password_hash).await?;

    tracing::info!(user_id = %user.id, "Password changed");
    Ok(ApiResponse::with_message((), "Password updated"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "not-an-email",
            "password": "Harvest2024",
            "name": "",
            "role": "donor"
        }))
        .unwrap();

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("name"));
    }

    #[test]
    fn test_register_rejects_unknown_role() {
        let result = serde_json::from_value::<RegisterRequest>(serde_json::json!({
            "email": "a@b.org",
            "password": "Harvest2024",
            "name": "A",
            "role": "superuser"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_profile_patch_distinguishes_null() {
        let req: UpdateProfileRequest =
            serde_json::from_str(r#"{"phone": null, "name": "New Name"}"#).unwrap();
        assert_eq!(req.phone, Some(None));
        assert_eq!(req.address, None);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_profile_phone_length_checked() {
        let req = UpdateProfileRequest {
            phone: Some(Some("9".repeat(40))),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_availability_check_maps_to_422() {
        let mut availability = Availability::default();
        availability.days.insert("funday".to_string(), vec![]);
        let err = check_availability(Some(&availability)).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
        assert!(check_availability(None).is_ok());
    }
}
