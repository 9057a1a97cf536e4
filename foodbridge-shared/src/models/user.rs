/// User model and database operations
///
/// Every account has exactly one role. Donors list food, NGOs verify and claim
/// it, volunteers move it, administrators oversee the platform.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email TEXT NOT NULL,              -- unique on LOWER(email)
///     password_hash TEXT NOT NULL,
///     name TEXT NOT NULL,
///     phone TEXT,
///     role user_role NOT NULL,
///     organization_name TEXT,
///     address TEXT,
///     latitude DOUBLE PRECISION,
///     longitude DOUBLE PRECISION,
///     is_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     verified_at TIMESTAMPTZ,
///     verified_by UUID,
///     trust_score INTEGER NOT NULL DEFAULT 50,
///     trust_badges TEXT[] NOT NULL DEFAULT '{}',
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     availability JSONB,
///     last_login_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use foodbridge_shared::models::user::{User, CreateUser, UserRole};
/// use foodbridge_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, CreateUser {
///     email: "pantry@example.org".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     name: "City Pantry".to_string(),
///     phone: None,
///     role: UserRole::Ngo,
///     organization_name: Some("City Pantry".to_string()),
///     address: None,
///     location: None,
///     availability: None,
/// }).await?;
///
/// let found = User::find_by_email(&pool, "Pantry@Example.org").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::geo::GeoPoint;

const USER_COLUMNS: &str = "id, email, password_hash, name, phone, role, organization_name, \
     address, latitude, longitude, is_verified, verified_at, verified_by, trust_score, \
     trust_badges, is_active, availability, last_login_at, created_at, updated_at";

/// Default trust score for new accounts
pub const DEFAULT_TRUST_SCORE: i32 = 50;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Restaurants, grocers, caterers and households listing surplus food
    Donor,

    /// Recipient organizations that verify and claim donations
    Ngo,

    /// Drivers who pick up and deliver claimed donations
    Volunteer,

    /// Platform operators
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Donor => "donor",
            UserRole::Ngo => "ngo",
            UserRole::Volunteer => "volunteer",
            UserRole::Admin => "admin",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "donor" => Ok(UserRole::Donor),
            "ngo" => Ok(UserRole::Ngo),
            "volunteer" => Ok(UserRole::Volunteer),
            "admin" => Ok(UserRole::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A single availability window in local "HH:MM" time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: String,
    pub end: String,
}

/// Weekly volunteer availability
///
/// Keys of `days` are lowercase weekday names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    #[serde(default)]
    pub days: BTreeMap<String, Vec<TimeSlot>>,

    /// How far the volunteer is willing to travel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_distance_km: Option<f64>,
}

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

impl Availability {
    /// Checks weekday keys, slot formats and slot ordering
    pub fn check(&self) -> Result<(), String> {
        for (day, slots) in &self.days {
            if !WEEKDAYS.contains(&day.as_str()) {
                return Err(format!("unknown weekday: {}", day));
            }
            for slot in slots {
                let start = NaiveTime::parse_from_str(&slot.start, "%H:%M")
                    .map_err(|_| format!("invalid start time on {}: {}", day, slot.start))?;
                let end = NaiveTime::parse_from_str(&slot.end, "%H:%M")
                    .map_err(|_| format!("invalid end time on {}: {}", day, slot.end))?;
                if start >= end {
                    return Err(format!(
                        "slot on {} must start before it ends ({} - {})",
                        day, slot.start, slot.end
                    ));
                }
            }
        }
        if let Some(km) = self.max_distance_km {
            if !(km > 0.0) {
                return Err("max_distance_km must be positive".to_string());
            }
        }
        Ok(())
    }
}

/// User model representing an account
///
/// The password hash is never serialized; handlers can return `User` as-is.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Stored lowercase; unique case-insensitively
    pub email: String,

    /// Argon2id PHC string
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub organization_name: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// Set by an administrator after checking credentials
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<Uuid>,

    /// Reputation from 0 to 100
    pub trust_score: i32,
    pub trust_badges: Vec<String>,

    /// Inactive accounts cannot log in
    pub is_active: bool,

    pub availability: Option<Json<Availability>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// The home/base location, when both coordinates are set
    pub fn location(&self) -> Option<GeoPoint> {
        GeoPoint::from_columns(self.latitude, self.longitude)
    }
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Email address (lowercased before storage)
    pub email: String,

    /// Argon2id password hash (NOT plaintext password!)
    pub password_hash: String,

    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub organization_name: Option<String>,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    pub availability: Option<Availability>,
}

/// Input for a profile edit
///
/// Only non-None fields are updated. Nested `Some(None)` clears a field.
/// There is deliberately no password field here; see [`User::update_password`].
#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub name: Option<String>,
    pub phone: Option<Option<String>>,
    pub organization_name: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub location: Option<Option<GeoPoint>>,
    pub availability: Option<Option<Availability>>,
}

impl UpdateProfile {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.organization_name.is_none()
            && self.address.is_none()
            && self.location.is_none()
            && self.availability.is_none()
    }
}

/// Result of [`User::delete`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,

    /// The user is still part of a live claim or pickup
    InUse,
}

/// Filters for listing users
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub is_verified: Option<bool>,
    pub is_active: Option<bool>,
}

impl UserFilter {
    fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" WHERE TRUE");
        if let Some(role) = self.role {
            builder.push(" AND role = ").push_bind(role);
        }
        if let Some(verified) = self.is_verified {
            builder.push(" AND is_verified = ").push_bind(verified);
        }
        if let Some(active) = self.is_active {
            builder.push(" AND is_active = ").push_bind(active);
        }
    }
}

/// Users per role
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RoleCount {
    pub role: UserRole,
    pub count: i64,
}

impl User {
    /// Creates a new user in the database
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Email already exists (unique violation on `users_email_key`)
    /// - Database connection fails
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO users (email, password_hash, name, phone, role, organization_name,
                               address, latitude, longitude, availability, trust_score)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(data.email.trim().to_lowercase())
            .bind(data.password_hash)
            .bind(data.name)
            .bind(data.phone)
            .bind(data.role)
            .bind(data.organization_name)
            .bind(data.address)
            .bind(data.location.map(|p| p.latitude))
            .bind(data.location.map(|p| p.longitude))
            .bind(data.availability.map(Json))
            .bind(DEFAULT_TRUST_SCORE)
            .fetch_one(pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);

        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by email address (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(email.trim())
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Updates profile fields
    ///
    /// Returns the user unchanged (apart from `updated_at`) when `data` is empty,
    /// and None if the user doesn't exist.
    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        data: UpdateProfile,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = NOW()");

        if let Some(name) = data.name {
            builder.push(", name = ").push_bind(name);
        }
        if let Some(phone) = data.phone {
            builder.push(", phone = ").push_bind(phone);
        }
        if let Some(org) = data.organization_name {
            builder.push(", organization_name = ").push_bind(org);
        }
        if let Some(address) = data.address {
            builder.push(", address = ").push_bind(address);
        }
        if let Some(location) = data.location {
            builder
                .push(", latitude = ")
                .push_bind(location.map(|p| p.latitude))
                .push(", longitude = ")
                .push_bind(location.map(|p| p.longitude));
        }
        if let Some(availability) = data.availability {
            builder
                .push(", availability = ")
                .push_bind(availability.map(Json));
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(USER_COLUMNS);

        let user = builder
            .build_query_as::<User>()
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Replaces the password hash
    ///
    /// This is the only write path for `password_hash`.
    pub async fn update_password(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Marks a user verified (or revokes verification)
    pub async fn set_verification(
        pool: &PgPool,
        id: Uuid,
        verified: bool,
        verified_by: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE users
            SET is_verified = $2,
                verified_at = CASE WHEN $2 THEN NOW() ELSE NULL END,
                verified_by = CASE WHEN $2 THEN $3 ELSE NULL END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(verified)
            .bind(verified_by)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Sets trust score and/or badges
    pub async fn update_trust(
        pool: &PgPool,
        id: Uuid,
        trust_score: Option<i32>,
        trust_badges: Option<Vec<String>>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE users
            SET trust_score = COALESCE($2, trust_score),
                trust_badges = COALESCE($3, trust_badges),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(trust_score)
            .bind(trust_badges)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Activates or deactivates an account
    pub async fn set_active(
        pool: &PgPool,
        id: Uuid,
        active: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(active)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Updates the last login timestamp for a user
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET last_login_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists users matching `filter`, newest first
    pub async fn list(
        pool: &PgPool,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
        builder.push(USER_COLUMNS).push(" FROM users");
        filter.push_where(&mut builder);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let users = builder.build_query_as::<User>().fetch_all(pool).await?;

        Ok(users)
    }

    /// Counts users matching `filter`
    pub async fn count(pool: &PgPool, filter: &UserFilter) -> Result<i64, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        filter.push_where(&mut builder);

        let (count,): (i64,) = builder.build_query_as().fetch_one(pool).await?;

        Ok(count)
    }

    /// Counts active users per role
    pub async fn count_by_role(pool: &PgPool) -> Result<Vec<RoleCount>, sqlx::Error> {
        let counts = sqlx::query_as::<_, RoleCount>(
            r#"
            SELECT role, COUNT(*) AS count
            FROM users
            WHERE is_active
            GROUP BY role
            ORDER BY role
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(counts)
    }

    /// IDs of all active users with `role`, used for fan-out notifications
    pub async fn list_active_ids_by_role(
        pool: &PgPool,
        role: UserRole,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let ids: Vec<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE role = $1 AND is_active")
                .bind(role)
                .fetch_all(pool)
                .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// IDs of every deactivated account
    pub async fn inactive_ids(pool: &PgPool) -> Result<Vec<Uuid>, sqlx::Error> {
        let ids: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE NOT is_active")
            .fetch_all(pool)
            .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// Deletes a user by ID unless they are part of food still in motion
    ///
    /// Refused while the user is on a pickup that is neither completed nor
    /// cancelled, or holds (as donor or claimer) a donation between `claimed`
    /// and `delivered`. The check and the delete are one statement. Finished
    /// donations and pickups cascade with the account.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<DeleteOutcome, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM users u
            WHERE u.id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM pickup_assignments p
                  WHERE u.id IN (p.volunteer_id, p.donor_id, p.recipient_id)
                    AND p.status NOT IN ('completed', 'cancelled')
              )
              AND NOT EXISTS (
                  SELECT 1 FROM food_donations d
                  WHERE u.id IN (d.donor_id, d.claimed_by)
                    AND d.status IN ('claimed', 'assigned', 'in_transit', 'delivered')
              )
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        let exists = Self::find_by_id(pool, id).await?.is_some();
        Ok(if exists {
            DeleteOutcome::InUse
        } else {
            DeleteOutcome::NotFound
        })
    }
}
