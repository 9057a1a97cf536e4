/// API route handlers, one module per resource
///
/// - `health`: liveness and database connectivity
/// - `auth`: registration, login, token refresh, own account
/// - `donations`: listing lifecycle (create, verify, claim, release, status, feedback)
/// - `pickups`: volunteer runs (assign, status, tracking, verification, rating)
/// - `users`: admin user management and public profiles
/// - `notifications`: in-app notifications
/// - `analytics`: admin overview and impact reports
/// - `audit`: admin audit trail

pub mod analytics;
pub mod audit;
pub mod auth;
pub mod donations;
pub mod health;
pub mod notifications;
pub mod pickups;
pub mod users;

use serde::{Deserialize, Deserializer};

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in PATCH-style request bodies
///
/// Use with `#[serde(default, deserialize_with = "nullable")]`.
pub(crate) fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        phone: Option<Option<String>>,
    }

    #[test]
    fn test_nullable_three_states() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.phone, None);

        let cleared: Patch = serde_json::from_str(r#"{"phone": null}"#).unwrap();
        assert_eq!(cleared.phone, Some(None));

        let set: Patch = serde_json::from_str(r#"{"phone": "555-0100"}"#).unwrap();
        assert_eq!(set.phone, Some(Some("555-0100".to_string())));
    }
}
