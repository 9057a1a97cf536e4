/// Notification fan-out for lifecycle events
///
/// Handlers call these after a write has committed. Each send runs on a
/// spawned task and is best-effort: failures are logged by
/// `Notification::send` and never reach the client.

use foodbridge_shared::models::{
    donation::FoodDonation,
    notification::{NewNotification, Notification, NotificationKind},
    pickup::{PickupAssignment, PickupStatus},
    user::{User, UserRole},
};
use sqlx::PgPool;
use uuid::Uuid;

fn spawn_send(pool: &PgPool, notifications: Vec<NewNotification>) {
    if notifications.is_empty() {
        return;
    }
    let pool = pool.clone();
    tokio::spawn(async move {
        for notification in notifications {
            Notification::send(&pool, notification).await;
        }
    });
}

/// Result of a verification decision, sent to the donor; publishing also
/// tells every active NGO the listing is open
pub fn donation_verified(pool: &PgPool, donation: &FoodDonation, approved: bool, published: bool) {
    let donor_notice = if approved {
        NewNotification::new(
            donation.donor_id,
            NotificationKind::DonationVerified,
            "Donation approved",
            format!("\"{}\" passed verification", donation.title),
        )
    } else {
        NewNotification::new(
            donation.donor_id,
            NotificationKind::DonationRejected,
            "Donation rejected",
            match &donation.verification_notes {
                Some(notes) => format!("\"{}\" was rejected: {}", donation.title, notes),
                None => format!("\"{}\" was rejected", donation.title),
            },
        )
    };
    spawn_send(pool, vec![donor_notice.with_donation(donation.id)]);

    if published {
        donation_published(pool, donation);
    }
}

/// Tells every active NGO that a listing is open for claiming
pub fn donation_published(pool: &PgPool, donation: &FoodDonation) {
    let pool = pool.clone();
    let (donation_id, title, urgency) = (donation.id, donation.title.clone(), donation.urgency_level);

    tokio::spawn(async move {
        let ngo_ids = match User::list_active_ids_by_role(&pool, UserRole::Ngo).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, donation_id = %donation_id, "Failed to load NGOs for fan-out");
                return;
            }
        };

        for ngo_id in ngo_ids {
            let notice = NewNotification::new(
                ngo_id,
                NotificationKind::DonationVerified,
                "New donation available",
                format!("\"{}\" is available ({} urgency)", title, urgency),
            )
            .with_donation(donation_id);
            Notification::send(&pool, notice).await;
        }
    });
}

pub fn donation_claimed(pool: &PgPool, donation: &FoodDonation) {
    spawn_send(
        pool,
        vec![NewNotification::new(
            donation.donor_id,
            NotificationKind::DonationClaimed,
            "Donation claimed",
            format!("\"{}\" was claimed by a recipient organization", donation.title),
        )
        .with_donation(donation.id)],
    );
}

pub fn feedback_received(pool: &PgPool, donation: &FoodDonation, rating: i16) {
    spawn_send(
        pool,
        vec![NewNotification::new(
            donation.donor_id,
            NotificationKind::FeedbackReceived,
            "Feedback received",
            format!("The recipient rated \"{}\" {}/5", donation.title, rating),
        )
        .with_donation(donation.id)],
    );
}

/// New run: the volunteer, the donor and the recipient hear about it,
/// except whoever made the assignment
pub fn pickup_assigned(pool: &PgPool, pickup: &PickupAssignment, actor_id: Uuid) {
    let notices = participants(pickup)
        .into_iter()
        .filter(|id| *id != actor_id)
        .map(|user_id| {
            let message = if user_id == pickup.volunteer_id {
                format!(
                    "You have a pickup scheduled for {}",
                    pickup.scheduled_pickup_at.format("%Y-%m-%d %H:%M UTC")
                )
            } else {
                "A volunteer has been assigned to the pickup".to_string()
            };
            NewNotification::new(
                user_id,
                NotificationKind::PickupAssigned,
                "Pickup assigned",
                message,
            )
            .with_donation(pickup.donation_id)
            .with_pickup(pickup.id)
        })
        .collect();

    spawn_send(pool, notices);
}

/// Status change on a run, sent to the other participants
pub fn pickup_status_changed(pool: &PgPool, pickup: &PickupAssignment, actor_id: Uuid) {
    let kind = match pickup.status {
        PickupStatus::Delivered | PickupStatus::Completed => NotificationKind::DeliveryCompleted,
        _ => NotificationKind::PickupStatus,
    };
    let title = match pickup.status {
        PickupStatus::Cancelled => "Pickup cancelled".to_string(),
        status => format!("Pickup {}", status.as_str().replace('_', " ")),
    };
    let message = match (&pickup.status, &pickup.cancellation_reason) {
        (PickupStatus::Cancelled, Some(reason)) => format!("The pickup was cancelled: {}", reason),
        (status, _) => format!("The pickup is now {}", status.as_str().replace('_', " ")),
    };

    let notices = participants(pickup)
        .into_iter()
        .filter(|id| *id != actor_id)
        .map(|user_id| {
            NewNotification::new(user_id, kind, title.clone(), message.clone())
                .with_donation(pickup.donation_id)
                .with_pickup(pickup.id)
        })
        .collect();

    spawn_send(pool, notices);
}

pub fn account_verified(pool: &PgPool, user_id: Uuid) {
    spawn_send(
        pool,
        vec![NewNotification::new(
            user_id,
            NotificationKind::AccountVerified,
            "Account verified",
            "Your account has been verified by an administrator",
        )],
    );
}

fn participants(pickup: &PickupAssignment) -> Vec<Uuid> {
    let mut ids = vec![pickup.volunteer_id, pickup.donor_id, pickup.recipient_id];
    ids.sort();
    ids.dedup();
    ids
}
