//! Urgency derived from time remaining until a donation expires
//!
//! One threshold table drives both the Rust classification and the SQL `CASE`
//! expression the models and the worker embed in their UPDATE statements, so
//! the value stored by a database-side refresh is the value Rust would compute.
//!
//! | Hours until expiry | Level      |
//! |--------------------|------------|
//! | `<= 2` (or past)   | `critical` |
//! | `<= 6`             | `high`     |
//! | `<= 12`            | `medium`   |
//! | otherwise          | `low`      |

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound (inclusive, in seconds) for each level, most urgent first
const THRESHOLDS: [(i64, UrgencyLevel); 3] = [
    (2 * 3600, UrgencyLevel::Critical),
    (6 * 3600, UrgencyLevel::High),
    (12 * 3600, UrgencyLevel::Medium),
];

/// Donation urgency level
///
/// Variants are declared in ascending order so `Ord` sorts least urgent first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "urgency_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::High => "high",
            UrgencyLevel::Critical => "critical",
        }
    }

    /// Classifies a remaining duration; negative durations are critical
    pub fn from_remaining(remaining: Duration) -> Self {
        let remaining_ms = remaining.num_milliseconds();
        for (limit_secs, level) in THRESHOLDS {
            if remaining_ms <= limit_secs * 1000 {
                return level;
            }
        }
        UrgencyLevel::Low
    }

    /// Classifies an expiry instant relative to `now`
    pub fn from_expiry(expiry: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::from_remaining(expiry - now)
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UrgencyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(UrgencyLevel::Low),
            "medium" => Ok(UrgencyLevel::Medium),
            "high" => Ok(UrgencyLevel::High),
            "critical" => Ok(UrgencyLevel::Critical),
            other => Err(format!("unknown urgency level: {}", other)),
        }
    }
}

/// Renders the threshold table as a SQL expression over `column`
///
/// The result evaluates to an `urgency_level` value relative to `NOW()`.
/// `column` is interpolated verbatim and must be a trusted identifier.
pub fn sql_case(column: &str) -> String {
    let mut sql = String::from("(CASE");
    for (limit_secs, level) in THRESHOLDS {
        sql.push_str(&format!(
            " WHEN {} <= NOW() + INTERVAL '{} seconds' THEN '{}'",
            column,
            limit_secs,
            level.as_str()
        ));
    }
    sql.push_str(" ELSE 'low' END)::urgency_level");
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level_at(seconds: i64) -> UrgencyLevel {
        UrgencyLevel::from_remaining(Duration::seconds(seconds))
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        assert_eq!(level_at(2 * 3600), UrgencyLevel::Critical);
        assert_eq!(level_at(6 * 3600), UrgencyLevel::High);
        assert_eq!(level_at(12 * 3600), UrgencyLevel::Medium);
    }

    #[test]
    fn test_just_past_boundaries() {
        assert_eq!(level_at(2 * 3600 + 1), UrgencyLevel::High);
        assert_eq!(level_at(6 * 3600 + 1), UrgencyLevel::Medium);
        assert_eq!(level_at(12 * 3600 + 1), UrgencyLevel::Low);
        assert_eq!(
            UrgencyLevel::from_remaining(Duration::milliseconds(2 * 3600 * 1000 + 1)),
            UrgencyLevel::High
        );
    }

    #[test]
    fn test_expired_is_critical() {
        assert_eq!(level_at(0), UrgencyLevel::Critical);
        assert_eq!(level_at(-3600), UrgencyLevel::Critical);
    }

    #[test]
    fn test_from_expiry() {
        let now = Utc::now();
        assert_eq!(
            UrgencyLevel::from_expiry(now + Duration::days(3), now),
            UrgencyLevel::Low
        );
        assert_eq!(
            UrgencyLevel::from_expiry(now + Duration::hours(5), now),
            UrgencyLevel::High
        );
    }

    #[test]
    fn test_ordering() {
        assert!(UrgencyLevel::Critical > UrgencyLevel::High);
        assert!(UrgencyLevel::High > UrgencyLevel::Medium);
        assert!(UrgencyLevel::Medium > UrgencyLevel::Low);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("high".parse::<UrgencyLevel>(), Ok(UrgencyLevel::High));
        assert!("urgent".parse::<UrgencyLevel>().is_err());
    }

    #[test]
    fn test_sql_case_mirrors_table() {
        let sql = sql_case("expiry_date");
        assert!(sql.starts_with("(CASE WHEN expiry_date <= NOW() + INTERVAL '7200 seconds' THEN 'critical'"));
        assert!(sql.contains("INTERVAL '21600 seconds' THEN 'high'"));
        assert!(sql.contains("INTERVAL '43200 seconds' THEN 'medium'"));
        assert!(sql.ends_with("ELSE 'low' END)::urgency_level"));
    }
}
