/// Sweep trait and the built-in sweeps
///
/// A sweep is one idempotent maintenance pass over the database. The
/// sweeper runs every registered sweep in order on each tick.
///
/// # Built-in sweeps
///
/// - [`ExpireOverdue`]: open donations past their expiry become `expired`;
///   the donor (and the claiming NGO, if any) is notified
/// - [`RefreshUrgency`]: recomputes urgency for live donations whose level
///   drifted as time passed
///
/// Expiry runs first so the refresh doesn't touch rows about to close.
///
/// # Example
///
/// ```no_run
/// use foodbridge_worker::sweep::{Sweep, SweepReport, SweepResult};
/// use async_trait::async_trait;
/// use sqlx::PgPool;
///
/// struct PurgeReadNotifications;
///
/// #[async_trait]
/// impl Sweep for PurgeReadNotifications {
///     fn name(&self) -> &'static str {
///         "purge_read_notifications"
///     }
///
///     async fn run(&self, pool: &PgPool) -> SweepResult<SweepReport> {
///         let result = sqlx::query(
///             "DELETE FROM notifications WHERE read_at < NOW() - INTERVAL '90 days'",
///         )
///         .execute(pool)
///         .await?;
///         Ok(SweepReport::new(result.rows_affected()))
///     }
/// }
/// ```

use async_trait::async_trait;
use foodbridge_shared::models::{
    donation::FoodDonation,
    notification::{NewNotification, Notification, NotificationKind},
};
use sqlx::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type SweepResult<T> = Result<T, SweepError>;

/// Outcome of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Rows changed by the pass
    pub affected: u64,
}

impl SweepReport {
    pub fn new(affected: u64) -> Self {
        Self { affected }
    }
}

#[async_trait]
pub trait Sweep: Send + Sync {
    /// Stable name used in logs
    fn name(&self) -> &'static str;

    async fn run(&self, pool: &PgPool) -> SweepResult<SweepReport>;
}

/// Expires open donations whose expiry date has passed
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpireOverdue;

impl ExpireOverdue {
    /// Notices for one expired donation: the donor, plus the NGO holding a claim
    fn notices(donation: &FoodDonation) -> Vec<NewNotification> {
        let donor = NewNotification::new(
            donation.donor_id,
            NotificationKind::DonationExpired,
            "Donation expired",
            format!(
                "\"{}\" expired on {} before it was collected",
                donation.title,
                donation.expiry_date.format("%Y-%m-%d %H:%M UTC")
            ),
        )
        .with_donation(donation.id);

        let mut notices = vec![donor];
        if let Some(ngo_id) = donation.claimed_by {
            notices.push(
                NewNotification::new(
                    ngo_id,
                    NotificationKind::DonationExpired,
                    "Claimed donation expired",
                    format!("\"{}\" expired before a pickup was arranged", donation.title),
                )
                .with_donation(donation.id),
            );
        }
        notices
    }
}

#[async_trait]
impl Sweep for ExpireOverdue {
    fn name(&self) -> &'static str {
        "expire_overdue"
    }

    async fn run(&self, pool: &PgPool) -> SweepResult<SweepReport> {
        let expired = FoodDonation::expire_overdue(pool).await?;

        for donation in &expired {
            tracing::info!(
                donation_id = %donation.id,
                donor_id = %donation.donor_id,
                "Donation expired"
            );
            for notice in Self::notices(donation) {
                Notification::send(pool, notice).await;
            }
        }

        Ok(SweepReport::new(expired.len() as u64))
    }
}

/// Recomputes urgency levels from the time left until expiry
#[derive(Debug, Default, Clone, Copy)]
pub struct RefreshUrgency;

#[async_trait]
impl Sweep for RefreshUrgency {
    fn name(&self) -> &'static str {
        "refresh_urgency"
    }

    async fn run(&self, pool: &PgPool) -> SweepResult<SweepReport> {
        let changed = FoodDonation::refresh_urgency(pool).await?;
        Ok(SweepReport::new(changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use foodbridge_shared::{
        geo::GeoPoint,
        models::donation::{
            DonationStatus, FoodCategory, QuantityUnit, SafetyChecklist, StorageRequirement,
        },
        urgency::UrgencyLevel,
    };
    use uuid::Uuid;

    fn donation(claimed_by: Option<Uuid>) -> FoodDonation {
        let now = Utc::now();
        let location = GeoPoint {
            latitude: 40.7,
            longitude: -74.0,
        };
        FoodDonation {
            id: Uuid::new_v4(),
            donor_id: Uuid::new_v4(),
            title: "Day-old bread".to_string(),
            description: None,
            category: FoodCategory::Bakery,
            quantity: 12.0,
            unit: QuantityUnit::Items,
            expiry_date: now - Duration::minutes(5),
            prepared_at: None,
            storage: StorageRequirement::RoomTemperature,
            dietary_tags: vec![],
            allergens: vec![],
            pickup_address: "3 Baker Ln".to_string(),
            latitude: location.latitude,
            longitude: location.longitude,
            pickup_window_start: None,
            pickup_window_end: None,
            pickup_instructions: None,
            safety_checklist: sqlx::types::Json(SafetyChecklist::default()),
            status: DonationStatus::Expired,
            urgency_level: UrgencyLevel::Critical,
            verified_by: None,
            verified_at: None,
            verification_notes: None,
            claimed_by,
            claimed_at: None,
            recipient_feedback: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_expired_unclaimed_notifies_donor_only() {
        let d = donation(None);
        let notices = ExpireOverdue::notices(&d);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].user_id, d.donor_id);
        assert_eq!(notices[0].kind, NotificationKind::DonationExpired);
        assert_eq!(notices[0].donation_id, Some(d.id));
    }

    #[test]
    fn test_expired_claim_notifies_ngo_too() {
        let ngo = Uuid::new_v4();
        let notices = ExpireOverdue::notices(&donation(Some(ngo)));
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[1].user_id, ngo);
    }

    #[test]
    fn test_sweep_names_are_distinct() {
        assert_ne!(ExpireOverdue.name(), RefreshUrgency.name());
    }
}
