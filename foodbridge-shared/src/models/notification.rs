//! In-app notifications
//!
//! Notifications are written as a side effect of lifecycle events. Callers
//! treat writes as best-effort: a failed insert is logged and never fails the
//! request that triggered it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use uuid::Uuid;

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, message, donation_id, pickup_id, read_at, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DonationVerified,
    DonationRejected,
    DonationClaimed,
    DonationExpired,
    PickupAssigned,
    PickupStatus,
    DeliveryCompleted,
    AccountVerified,
    FeedbackReceived,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::DonationVerified => "donation_verified",
            NotificationKind::DonationRejected => "donation_rejected",
            NotificationKind::DonationClaimed => "donation_claimed",
            NotificationKind::DonationExpired => "donation_expired",
            NotificationKind::PickupAssigned => "pickup_assigned",
            NotificationKind::PickupStatus => "pickup_status",
            NotificationKind::DeliveryCompleted => "delivery_completed",
            NotificationKind::AccountVerified => "account_verified",
            NotificationKind::FeedbackReceived => "feedback_received",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub donation_id: Option<Uuid>,
    pub pickup_id: Option<Uuid>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub donation_id: Option<Uuid>,
    pub pickup_id: Option<Uuid>,
}

impl NewNotification {
    pub fn new(
        user_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            donation_id: None,
            pickup_id: None,
        }
    }

    pub fn with_donation(mut self, donation_id: Uuid) -> Self {
        self.donation_id = Some(donation_id);
        self
    }

    pub fn with_pickup(mut self, pickup_id: Uuid) -> Self {
        self.pickup_id = Some(pickup_id);
        self
    }
}

impl Notification {
    pub async fn create(pool: &PgPool, data: NewNotification) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO notifications (user_id, kind, title, message, donation_id, pickup_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        );

        let notification = sqlx::query_as::<_, Notification>(&query)
            .bind(data.user_id)
            .bind(data.kind)
            .bind(data.title)
            .bind(data.message)
            .bind(data.donation_id)
            .bind(data.pickup_id)
            .fetch_one(pool)
            .await?;

        Ok(notification)
    }

    /// Creates the notification, logging instead of returning failures
    pub async fn send(pool: &PgPool, data: NewNotification) {
        let user_id = data.user_id;
        let kind = data.kind;
        if let Err(e) = Self::create(pool, data).await {
            tracing::warn!(
                user_id = %user_id,
                kind = %kind,
                error = %e,
                "Failed to create notification"
            );
        }
    }

    /// Lists a user's notifications, newest first
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE user_id = $1 AND ($2 = FALSE OR read_at IS NULL)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            NOTIFICATION_COLUMNS
        );

        let notifications = sqlx::query_as::<_, Notification>(&query)
            .bind(user_id)
            .bind(unread_only)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok(notifications)
    }

    pub async fn count_for_user(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    pub async fn count_unread(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Marks one notification read
    ///
    /// Scoped to the owner; returns false if not found or not theirs.
    pub async fn mark_read(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Marks every unread notification read; returns how many changed
    pub async fn mark_all_read(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = NOW() WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(NotificationKind::PickupAssigned.as_str(), "pickup_assigned");
        assert_eq!(
            serde_json::to_string(&NotificationKind::DonationExpired).unwrap(),
            "\"donation_expired\""
        );
    }

    #[test]
    fn test_builder_links() {
        let donation_id = Uuid::new_v4();
        let pickup_id = Uuid::new_v4();
        let n = NewNotification::new(
            Uuid::new_v4(),
            NotificationKind::PickupStatus,
            "Pickup update",
            "Your food is on the way",
        )
        .with_donation(donation_id)
        .with_pickup(pickup_id);

        assert_eq!(n.donation_id, Some(donation_id));
        assert_eq!(n.pickup_id, Some(pickup_id));
        assert_eq!(n.title, "Pickup update");
    }
}
