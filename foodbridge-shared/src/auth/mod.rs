/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and policy
/// - [`jwt`]: HS256 access/refresh tokens carrying user id and role
/// - [`middleware`]: Bearer-token extraction into an [`middleware::AuthContext`]
/// - [`authorization`]: Role and ownership rules for donations and pickups
///
/// # Example
///
/// ```no_run
/// use foodbridge_shared::auth::jwt::{issue_token_pair, validate_access_token};
/// use foodbridge_shared::auth::password::{compare_password, hash_password};
/// use foodbridge_shared::models::user::UserRole;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Harvest2024")?;
/// assert!(compare_password("Harvest2024", &hash)?);
///
/// let secret = "a-signing-secret-of-at-least-32-chars";
/// let tokens = issue_token_pair(uuid::Uuid::new_v4(), UserRole::Donor, secret, chrono::Duration::hours(24))?;
/// let claims = validate_access_token(&tokens.access_token, secret)?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
