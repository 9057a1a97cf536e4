//! Shared helpers for database-backed tests
//!
//! Tests call [`test_pool`] and return early when it yields None, so the suite
//! passes on machines without PostgreSQL. Point `DATABASE_URL` at a scratch
//! database to run them.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use foodbridge_shared::db::migrations::{ensure_database_exists, run_migrations};
use foodbridge_shared::db::pool::{create_pool, DatabaseConfig};
use foodbridge_shared::geo::GeoPoint;
use foodbridge_shared::models::donation::{
    CreateDonation, FoodCategory, FoodDonation, QuantityUnit, SafetyChecklist, StorageRequirement,
};
use foodbridge_shared::models::user::{CreateUser, User, UserRole};
use sqlx::PgPool;
use uuid::Uuid;

/// Connects and migrates, or returns None when DATABASE_URL is unset
pub async fn test_pool() -> Option<PgPool> {
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

    let pool = create_pool(DatabaseConfig {
        url,
        max_connections: 5,
        ..Default::default()
    })
    .await
    .expect("Failed to connect to test database");

    run_migrations(&pool).await.expect("Failed to run migrations");

    Some(pool)
}

pub async fn create_user(pool: &PgPool, role: UserRole) -> User {
    User::create(
        pool,
        CreateUser {
            email: format!("{}-{}@test.foodbridge.org", role, Uuid::new_v4()),
            password_hash: "$argon2id$v=19$m=65536,t=3,p=4$c2FsdA$aGFzaA".to_string(),
            name: format!("Test {}", role),
            phone: None,
            role,
            organization_name: None,
            address: None,
            location: Some(GeoPoint {
                latitude: 40.7306,
                longitude: -73.9866,
            }),
            availability: None,
        },
    )
    .await
    .expect("Failed to create user")
}

pub fn full_checklist() -> SafetyChecklist {
    SafetyChecklist {
        temperature_controlled: true,
        properly_packaged: true,
        labeled_with_date: true,
        allergens_disclosed: true,
        hygiene_followed: true,
    }
}

pub async fn create_donation_expiring(
    pool: &PgPool,
    donor_id: Uuid,
    expiry_date: DateTime<Utc>,
) -> FoodDonation {
    FoodDonation::create(
        pool,
        CreateDonation {
            donor_id,
            title: "Surplus sandwiches".to_string(),
            description: Some("From the lunch service".to_string()),
            category: FoodCategory::PreparedFood,
            quantity: 24.0,
            unit: QuantityUnit::Servings,
            expiry_date,
            prepared_at: Some(Utc::now()),
            storage: StorageRequirement::Refrigerated,
            dietary_tags: vec!["vegetarian".to_string()],
            allergens: vec!["gluten".to_string()],
            pickup_address: "12 Market St".to_string(),
            location: GeoPoint {
                latitude: 40.7128,
                longitude: -74.0060,
            },
            pickup_window_start: None,
            pickup_window_end: None,
            pickup_instructions: None,
            safety_checklist: full_checklist(),
        },
    )
    .await
    .expect("Failed to create donation")
}

pub async fn create_donation(pool: &PgPool, donor_id: Uuid) -> FoodDonation {
    create_donation_expiring(pool, donor_id, Utc::now() + Duration::days(2)).await
}
