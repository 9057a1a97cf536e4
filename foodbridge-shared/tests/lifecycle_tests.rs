/// End-to-end donation and pickup lifecycle against PostgreSQL
///
/// Skipped unless DATABASE_URL is set.

mod common;

use chrono::{Duration, Utc};
use foodbridge_shared::geo::GeoPoint;
use foodbridge_shared::lifecycle::TransitionError;
use foodbridge_shared::models::donation::{DonationStatus, FoodDonation};
use foodbridge_shared::models::pickup::{
    CreatePickup, ItemCondition, PickupAssignment, PickupStatus, Rating, RatingSide, Verification,
};
use foodbridge_shared::models::user::{DeleteOutcome, User, UserRole};
use foodbridge_shared::urgency::UrgencyLevel;
use sqlx::PgPool;
use uuid::Uuid;

fn verification() -> Verification {
    Verification {
        photo_url: Some("https://cdn.example.org/p.jpg".to_string()),
        signature: None,
        condition: ItemCondition::Good,
        notes: None,
        verified_at: Utc::now(),
    }
}

/// Donor, NGO and a donation already claimed by that NGO
async fn claimed_donation(pool: &PgPool) -> (Uuid, Uuid, FoodDonation) {
    let donor = common::create_user(pool, UserRole::Donor).await;
    let ngo = common::create_user(pool, UserRole::Ngo).await;
    let donation = common::create_donation(pool, donor.id).await;

    FoodDonation::verify(pool, donation.id, ngo.id, true, true, None)
        .await
        .expect("verify");
    let claimed = FoodDonation::claim(pool, donation.id, ngo.id)
        .await
        .expect("claim");

    (donor.id, ngo.id, claimed)
}

async fn assign(pool: &PgPool, donation_id: Uuid, assigned_by: Uuid) -> PickupAssignment {
    let volunteer = common::create_user(pool, UserRole::Volunteer).await;

    PickupAssignment::create(
        pool,
        CreatePickup {
            donation_id,
            volunteer_id: volunteer.id,
            assigned_by,
            scheduled_pickup_at: Utc::now() + Duration::hours(1),
            scheduled_delivery_at: None,
            delivery_location: GeoPoint {
                latitude: 40.7306,
                longitude: -73.9866,
            },
            notes: None,
        },
    )
    .await
    .expect("assign pickup")
}

async fn donation_status(pool: &PgPool, id: Uuid) -> DonationStatus {
    FoodDonation::find_by_id(pool, id)
        .await
        .expect("load donation")
        .expect("donation exists")
        .status
}

#[tokio::test]
async fn test_urgency_is_computed_on_create() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let donor = common::create_user(&pool, UserRole::Donor).await;

    let soon = common::create_donation_expiring(&pool, donor.id, Utc::now() + Duration::hours(1)).await;
    let later = common::create_donation_expiring(&pool, donor.id, Utc::now() + Duration::hours(5)).await;
    let far = common::create_donation_expiring(&pool, donor.id, Utc::now() + Duration::days(3)).await;

    assert_eq!(soon.urgency_level, UrgencyLevel::Critical);
    assert_eq!(later.urgency_level, UrgencyLevel::High);
    assert_eq!(far.urgency_level, UrgencyLevel::Low);
    assert_eq!(far.status, DonationStatus::Pending);
}

#[tokio::test]
async fn test_full_lifecycle_moves_donation_with_pickup() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let (_donor_id, ngo_id, donation) = claimed_donation(&pool).await;
    assert_eq!(donation.claimed_by, Some(ngo_id));

    let pickup = assign(&pool, donation.id, ngo_id).await;
    assert_eq!(pickup.status, PickupStatus::Assigned);
    assert_eq!(pickup.recipient_id, ngo_id);
    assert!(pickup.route.distance_km > 0.0);
    assert_eq!(donation_status(&pool, donation.id).await, DonationStatus::Assigned);

    for target in [PickupStatus::Accepted, PickupStatus::InTransit] {
        let moved = PickupAssignment::transition(&pool, pickup.id, target, None)
            .await
            .expect("advance pickup");
        assert_eq!(moved.status, target);
    }
    assert_eq!(donation_status(&pool, donation.id).await, DonationStatus::Assigned);

    let tracked = PickupAssignment::record_location(
        &pool,
        pickup.id,
        GeoPoint {
            latitude: 40.72,
            longitude: -74.0,
        },
    )
    .await
    .expect("record location")
    .expect("trackable");
    assert_eq!(tracked.route.waypoints.len(), 1);

    let picked = PickupAssignment::verify_pickup(&pool, pickup.id, verification())
        .await
        .expect("verify pickup");
    assert!(picked.picked_up_at.is_some());
    assert_eq!(donation_status(&pool, donation.id).await, DonationStatus::InTransit);

    PickupAssignment::transition(&pool, pickup.id, PickupStatus::Delivering, None)
        .await
        .expect("delivering");
    PickupAssignment::verify_delivery(&pool, pickup.id, verification())
        .await
        .expect("verify delivery");
    assert_eq!(donation_status(&pool, donation.id).await, DonationStatus::Delivered);

    let rating = Rating {
        score: 5,
        comment: Some("On time".to_string()),
        rated_at: Utc::now(),
    };
    let completed = PickupAssignment::complete(&pool, pickup.id, Some((RatingSide::Recipient, rating)))
        .await
        .expect("complete");
    assert_eq!(completed.status, PickupStatus::Completed);
    assert_eq!(
        completed.rating(RatingSide::Recipient).map(|r| r.score),
        Some(5)
    );
    assert_eq!(donation_status(&pool, donation.id).await, DonationStatus::Completed);

    // Each side rates once
    let again = Rating {
        score: 1,
        comment: None,
        rated_at: Utc::now(),
    };
    assert!(matches!(
        PickupAssignment::rate(&pool, pickup.id, RatingSide::Recipient, again).await,
        Err(TransitionError::Precondition(_))
    ));

    let feedback = FoodDonation::submit_feedback(&pool, donation.id, 4, None)
        .await
        .expect("feedback");
    assert_eq!(feedback.recipient_feedback.map(|f| f.0.rating), Some(4));
}

#[tokio::test]
async fn test_cancelling_pickup_returns_donation_to_claimed() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let (_, ngo_id, donation) = claimed_donation(&pool).await;
    let pickup = assign(&pool, donation.id, ngo_id).await;

    let cancelled = PickupAssignment::transition(
        &pool,
        pickup.id,
        PickupStatus::Cancelled,
        Some("Vehicle broke down".to_string()),
    )
    .await
    .expect("cancel");
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Vehicle broke down"));
    assert_eq!(donation_status(&pool, donation.id).await, DonationStatus::Claimed);

    // The donation can be assigned again once the old run is cancelled
    let second = assign(&pool, donation.id, ngo_id).await;
    assert_eq!(second.status, PickupStatus::Assigned);
}

#[tokio::test]
async fn test_illegal_transitions_are_rejected() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let (_, ngo_id, donation) = claimed_donation(&pool).await;
    let pickup = assign(&pool, donation.id, ngo_id).await;

    assert!(matches!(
        PickupAssignment::transition(&pool, pickup.id, PickupStatus::Delivered, None).await,
        Err(TransitionError::Illegal { .. })
    ));
    assert!(matches!(
        FoodDonation::claim(&pool, donation.id, ngo_id).await,
        Err(TransitionError::Illegal { .. })
    ));
    assert!(matches!(
        PickupAssignment::transition(&pool, Uuid::new_v4(), PickupStatus::Accepted, None).await,
        Err(TransitionError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_claims_have_one_winner() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let donor = common::create_user(&pool, UserRole::Donor).await;
    let first = common::create_user(&pool, UserRole::Ngo).await;
    let second = common::create_user(&pool, UserRole::Ngo).await;
    let donation = common::create_donation(&pool, donor.id).await;
    FoodDonation::verify(&pool, donation.id, first.id, true, true, None)
        .await
        .expect("verify");

    let (a, b) = tokio::join!(
        FoodDonation::claim(&pool, donation.id, first.id),
        FoodDonation::claim(&pool, donation.id, second.id),
    );

    let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1);

    let loser = if a.is_ok() { b } else { a };
    assert!(loser.map_err(|e| e.is_conflict()).unwrap_err());
}

#[tokio::test]
async fn test_expire_overdue_only_touches_open_listings() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let donor = common::create_user(&pool, UserRole::Donor).await;
    let overdue =
        common::create_donation_expiring(&pool, donor.id, Utc::now() - Duration::hours(1)).await;
    let fresh = common::create_donation(&pool, donor.id).await;

    let expired = FoodDonation::expire_overdue(&pool).await.expect("sweep");
    assert!(expired.iter().any(|d| d.id == overdue.id));
    assert!(expired.iter().all(|d| d.id != fresh.id));

    assert_eq!(donation_status(&pool, overdue.id).await, DonationStatus::Expired);
    assert_eq!(donation_status(&pool, fresh.id).await, DonationStatus::Pending);
}

#[tokio::test]
async fn test_approval_requires_complete_checklist() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let donor = common::create_user(&pool, UserRole::Donor).await;
    let admin = common::create_user(&pool, UserRole::Admin).await;
    let donation = common::create_donation(&pool, donor.id).await;

    sqlx::query("UPDATE food_donations SET safety_checklist = '{}'::jsonb WHERE id = $1")
        .bind(donation.id)
        .execute(&pool)
        .await
        .expect("clear checklist");

    assert!(matches!(
        FoodDonation::verify(&pool, donation.id, admin.id, true, true, None).await,
        Err(TransitionError::Precondition(_))
    ));

    let rejected = FoodDonation::verify(&pool, donation.id, admin.id, false, false, Some("Unlabelled".into()))
        .await
        .expect("reject");
    assert_eq!(rejected.status, DonationStatus::Cancelled);
    assert_eq!(rejected.verified_by, Some(admin.id));
}

#[tokio::test]
async fn test_verify_only_reviews_pending_donations() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let (_, ngo_id, donation) = claimed_donation(&pool).await;
    let pickup = assign(&pool, donation.id, ngo_id).await;
    let admin = common::create_user(&pool, UserRole::Admin).await;

    // Rejecting an assigned donation would strand its pickup
    assert!(matches!(
        FoodDonation::verify(&pool, donation.id, admin.id, false, true, Some("late".into())).await,
        Err(TransitionError::Illegal {
            from: DonationStatus::Assigned,
            to: DonationStatus::Cancelled,
            ..
        })
    ));
    assert_eq!(donation_status(&pool, donation.id).await, DonationStatus::Assigned);
    let still = PickupAssignment::find_by_id(&pool, pickup.id)
        .await
        .expect("load pickup")
        .expect("pickup exists");
    assert_eq!(still.status, PickupStatus::Assigned);

    // A listing that is already published is not reviewed twice
    let donor = common::create_user(&pool, UserRole::Donor).await;
    let listed = common::create_donation(&pool, donor.id).await;
    FoodDonation::verify(&pool, listed.id, admin.id, true, true, None)
        .await
        .expect("approve");
    assert!(matches!(
        FoodDonation::verify(&pool, listed.id, admin.id, false, true, None).await,
        Err(TransitionError::Illegal { .. })
    ));
    assert_eq!(donation_status(&pool, listed.id).await, DonationStatus::Available);
}

#[tokio::test]
async fn test_direct_transition_refuses_pickup_owned_moves() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let (_, ngo_id, donation) = claimed_donation(&pool).await;

    // Claimed -> Assigned only happens by creating a pickup
    assert!(matches!(
        FoodDonation::transition(&pool, donation.id, DonationStatus::Assigned).await,
        Err(TransitionError::Precondition(_))
    ));

    let pickup = assign(&pool, donation.id, ngo_id).await;
    assert!(matches!(
        FoodDonation::transition(&pool, donation.id, DonationStatus::Claimed).await,
        Err(TransitionError::Precondition(_))
    ));
    assert_eq!(donation_status(&pool, donation.id).await, DonationStatus::Assigned);

    // Cancelling through the pickup still works
    PickupAssignment::transition(&pool, pickup.id, PickupStatus::Cancelled, None)
        .await
        .expect("cancel");
    assert_eq!(donation_status(&pool, donation.id).await, DonationStatus::Claimed);
}

#[tokio::test]
async fn test_delete_refused_while_user_has_live_work() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let (donor_id, ngo_id, donation) = claimed_donation(&pool).await;
    let pickup = assign(&pool, donation.id, ngo_id).await;

    for id in [pickup.volunteer_id, ngo_id, donor_id] {
        assert_eq!(User::delete(&pool, id).await.expect("delete"), DeleteOutcome::InUse);
    }
    assert_eq!(donation_status(&pool, donation.id).await, DonationStatus::Assigned);

    PickupAssignment::transition(&pool, pickup.id, PickupStatus::Cancelled, None)
        .await
        .expect("cancel");

    // The volunteer is free once the run is cancelled; the claimer is not
    assert_eq!(
        User::delete(&pool, pickup.volunteer_id).await.expect("delete"),
        DeleteOutcome::Deleted
    );
    assert_eq!(User::delete(&pool, ngo_id).await.expect("delete"), DeleteOutcome::InUse);
    assert_eq!(
        User::delete(&pool, Uuid::new_v4()).await.expect("delete"),
        DeleteOutcome::NotFound
    );
}
