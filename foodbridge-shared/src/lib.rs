//! # FoodBridge Shared Library
//!
//! This crate contains the domain types, persistence and business rules used
//! by both the FoodBridge API server and the background worker.
//!
//! ## Module Organization
//!
//! - `models`: Database models and their SQL operations
//! - `lifecycle`: Status machine trait and transition errors
//! - `urgency`: Time-to-expiry urgency table
//! - `geo`: Geolocation points and distance math
//! - `auth`: Password hashing, JWT, request identity and permissions
//! - `db`: Connection pool and embedded migrations

pub mod auth;
pub mod db;
pub mod geo;
pub mod lifecycle;
pub mod models;
pub mod urgency;

/// Current version of the FoodBridge shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
